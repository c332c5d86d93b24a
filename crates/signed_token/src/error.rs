use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid token version")]
    InvalidVersion,
    #[error("unexpected token kind")]
    WrongKind,
    #[error("signing secret for kid {0} is too short (minimum 32 bytes)")]
    SecretTooShort(String),
    #[error("signing secret for kid {0} is a known placeholder value")]
    PlaceholderSecret(String),
    #[error("active key id {0} is not present in the keyring")]
    ActiveKidMissing(String),
}
