use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{Error, Keyring, TOKEN_VERSION};

type HmacSha256 = Hmac<Sha256>;

/// Token kind discriminator carried in the claims.
///
/// Verifiers demand one specific kind, which is what makes a `step_up`
/// token structurally unusable as an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    StepUp,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::StepUp => "step_up",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

impl TokenHeader {
    fn hs256(kid: impl Into<String>) -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
            kid: kid.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub v: u8,
    pub iss: String,
    pub kind: TokenKind,
    /// Principal id.
    pub sub: String,
    /// Tenant id.
    pub tid: String,
    /// Session id; absent on step-up tokens, which are not bound to a
    /// session yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn hmac_tag(secret: &[u8], signing_input: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| Error::SecretTooShort(String::new()))?;
    mac.update(signing_input);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Create an HS256-signed token under the keyring's active kid.
///
/// # Errors
///
/// Returns an error if the active secret is missing or claims/header JSON
/// cannot be encoded.
pub fn sign_hs256(keyring: &Keyring, claims: &TokenClaims) -> Result<String, Error> {
    let header = TokenHeader::hs256(keyring.active_kid());
    let header_b64 = b64e_json(&header)?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let secret = keyring.active_secret()?;
    let tag = hmac_tag(secret, signing_input.as_bytes())?;
    let tag_b64 = Base64UrlUnpadded::encode_string(&tag);

    Ok(format!("{signing_input}.{tag_b64}"))
}

/// Verify an HS256 token and return its decoded claims.
///
/// # Errors
///
/// Returns an error if:
/// - the token is malformed or contains invalid base64/json,
/// - the `kid` is unknown to the keyring,
/// - the signature does not verify,
/// - the claims fail validation (`v`, `iss`, `kind`, `exp`).
pub fn verify_hs256(
    token: &str,
    keyring: &Keyring,
    expected_issuer: &str,
    expected_kind: TokenKind,
    now_unix_seconds: i64,
) -> Result<TokenClaims, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let tag_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != "HS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let secret = keyring
        .secret(&header.kid)
        .ok_or_else(|| Error::UnknownKid(header.kid.clone()))?;

    let signing_input = format!("{header_b64}.{claims_b64}");
    let expected_tag = hmac_tag(secret, signing_input.as_bytes())?;
    let presented_tag = Base64UrlUnpadded::decode_vec(tag_b64).map_err(|_| Error::Base64)?;
    if !bool::from(expected_tag.ct_eq(&presented_tag)) {
        return Err(Error::InvalidSignature);
    }

    let claims: TokenClaims = b64d_json(claims_b64)?;
    if claims.v != TOKEN_VERSION {
        return Err(Error::InvalidVersion);
    }
    if claims.iss != expected_issuer {
        return Err(Error::InvalidIssuer);
    }
    if claims.kind != expected_kind {
        return Err(Error::WrongKind);
    }
    if claims.exp <= now_unix_seconds {
        return Err(Error::Expired);
    }

    Ok(claims)
}
