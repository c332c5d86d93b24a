//! Server action: validate key material, assemble state, start serving.
//!
//! All placeholder/weak-secret rejection happens here, before anything
//! touches the network or the database. A misconfigured deployment never
//! comes up.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use base64ct::{Base64, Base64Unpadded, Encoding};
use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use signed_token::Keyring;

use crate::{
    api,
    api::handlers::auth::{AuthConfig, AuthState},
    audit::TracingAuditSink,
    guard::{GuardPolicies, NoopChallengeVerifier},
    password::{CredentialVerifier, HashCost},
    tokens::TokenConfig,
    totp::SeedCipher,
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub issuer: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub step_up_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub signing_kid: String,
    pub signing_secret: SecretString,
    pub retired_secrets: Vec<(String, SecretString)>,
    pub seed_key: SecretString,
    pub recovery_pepper: SecretString,
    pub hash_cost: HashCost,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if key material fails validation or the server
/// cannot start.
pub async fn execute(args: Args) -> Result<()> {
    let mut keyring = Keyring::new(
        args.signing_kid.clone(),
        decode_base64(args.signing_secret.expose_secret())
            .context("signing secret is not valid base64")?,
    )
    .context("invalid signing secret")?;
    for (kid, secret) in &args.retired_secrets {
        keyring
            .insert(
                kid.clone(),
                decode_base64(secret.expose_secret())
                    .with_context(|| format!("retired secret {kid} is not valid base64"))?,
            )
            .with_context(|| format!("invalid retired secret {kid}"))?;
    }

    let seed_cipher = SeedCipher::from_base64(args.seed_key.expose_secret())
        .context("invalid TOTP seed key")?;

    let credentials =
        CredentialVerifier::new(args.hash_cost).context("invalid Argon2 configuration")?;
    credentials.dummy_hash_check()?;

    let auth_config = AuthConfig::new()
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_totp_issuer(args.issuer.clone());
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        credentials,
        Arc::new(NoopChallengeVerifier),
        Arc::new(TracingAuditSink),
        args.recovery_pepper.expose_secret().as_bytes().to_vec(),
    )?);

    let token_config = TokenConfig::new(args.issuer)
        .with_access_ttl(Duration::seconds(args.access_ttl_seconds))
        .with_refresh_ttl(Duration::seconds(args.refresh_ttl_seconds))
        .with_step_up_ttl(Duration::seconds(args.step_up_ttl_seconds));

    api::new(
        args.port,
        args.dsn,
        auth_state,
        Arc::new(keyring),
        token_config,
        GuardPolicies::default(),
        seed_cipher,
    )
    .await
}

fn decode_base64(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    Base64::decode_vec(trimmed)
        .or_else(|_| Base64Unpadded::decode_vec(trimmed))
        .map_err(|_| anyhow!("not valid base64"))
}

#[cfg(test)]
mod tests {
    use super::decode_base64;

    #[test]
    fn decode_accepts_padded_and_unpadded() {
        assert_eq!(
            decode_base64("aGVsbG8=").ok(),
            Some(b"hello".to_vec())
        );
        assert_eq!(
            decode_base64("aGVsbG8").ok(),
            Some(b"hello".to_vec())
        );
        assert!(decode_base64("!!!").is_err());
    }
}
