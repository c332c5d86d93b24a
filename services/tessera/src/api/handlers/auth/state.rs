//! Auth configuration and shared handler state.

use std::sync::Arc;

use chrono::Duration;

use crate::{
    audit::AuditSink,
    guard::ChallengeVerifier,
    password::CredentialVerifier,
};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_TOTP_ISSUER: &str = "tessera";
const MIN_PEPPER_BYTES: usize = 16;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    totp_issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    /// The session's absolute lifetime, fixed at creation.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AuthState {
    config: AuthConfig,
    credentials: CredentialVerifier,
    challenge: Arc<dyn ChallengeVerifier>,
    audit: Arc<dyn AuditSink>,
    recovery_pepper: Arc<[u8]>,
}

impl AuthState {
    /// Assemble the shared auth state.
    ///
    /// # Errors
    /// Returns an error if the recovery pepper is too short to be real key
    /// material — the same startup-validation rule the signing secrets get.
    pub fn new(
        config: AuthConfig,
        credentials: CredentialVerifier,
        challenge: Arc<dyn ChallengeVerifier>,
        audit: Arc<dyn AuditSink>,
        recovery_pepper: Vec<u8>,
    ) -> anyhow::Result<Self> {
        if recovery_pepper.len() < MIN_PEPPER_BYTES {
            anyhow::bail!(
                "recovery pepper must be at least {MIN_PEPPER_BYTES} bytes, got {}",
                recovery_pepper.len()
            );
        }
        Ok(Self {
            config,
            credentials,
            challenge,
            audit,
            recovery_pepper: recovery_pepper.into(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialVerifier {
        &self.credentials
    }

    pub(crate) fn challenge(&self) -> &dyn ChallengeVerifier {
        self.challenge.as_ref()
    }

    #[must_use]
    pub fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    /// A cloneable handle for components that outlive one request.
    #[must_use]
    pub fn audit_handle(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.audit)
    }

    pub(crate) fn recovery_pepper(&self) -> &[u8] {
        &self.recovery_pepper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audit::TracingAuditSink, guard::NoopChallengeVerifier, password::HashCost};

    fn test_state(pepper: Vec<u8>) -> anyhow::Result<AuthState> {
        let credentials = CredentialVerifier::new(HashCost {
            m_cost_kib: 1024,
            t_cost: 1,
            p_cost: 1,
        })?;
        AuthState::new(
            AuthConfig::new(),
            credentials,
            Arc::new(NoopChallengeVerifier),
            Arc::new(TracingAuditSink),
            pepper,
        )
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new();
        assert_eq!(config.session_ttl(), Duration::days(30));
        assert_eq!(config.totp_issuer(), "tessera");

        let config = config
            .with_session_ttl_seconds(3600)
            .with_totp_issuer("example".to_string());
        assert_eq!(config.session_ttl(), Duration::hours(1));
        assert_eq!(config.totp_issuer(), "example");
    }

    #[test]
    fn short_pepper_is_rejected_at_startup() {
        assert!(test_state(b"short".to_vec()).is_err());
        assert!(test_state(b"long-enough-pepper-material".to_vec()).is_ok());
    }
}
