//! Error taxonomy for the auth core.
//!
//! Credential, MFA, and ownership failures collapse into a small set of
//! non-enumerating codes before they reach a caller: the wire never says
//! which check failed. Infrastructure failures (`Unavailable`) are a
//! distinct retryable class and are never conflated with a failed
//! authentication.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked")]
    AccountLocked { retry_after_seconds: u64 },
    #[error("rate limited")]
    RateLimited { retry_after_seconds: u64 },
    #[error("challenge required")]
    ChallengeRequired,
    #[error("second factor required")]
    MfaRequired,
    #[error("invalid MFA code")]
    InvalidMfaCode,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("token replay detected")]
    TokenReplayDetected,
    /// Also covers sessions owned by someone else; the caller cannot tell
    /// the difference.
    #[error("session not found")]
    SessionNotFound,
    #[error("tenant mismatch")]
    TenantMismatch,
    #[error("missing tenant context")]
    MissingTenant,
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    /// Store unreachable or timed out. Retryable; never "authenticated".
    #[error("service unavailable, try again")]
    Unavailable,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::InvalidMfaCode
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::TokenReplayDetected => StatusCode::UNAUTHORIZED,
            Self::MfaRequired | Self::TenantMismatch => StatusCode::FORBIDDEN,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::MissingTenant | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AccountLocked { .. } | Self::RateLimited { .. } | Self::ChallengeRequired => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::ChallengeRequired => "CHALLENGE_REQUIRED",
            Self::MfaRequired => "MFA_REQUIRED",
            Self::InvalidMfaCode => "INVALID_MFA_CODE",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenReplayDetected => "TOKEN_REPLAY_DETECTED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::TenantMismatch => "TENANT_MISMATCH",
            Self::MissingTenant => "MISSING_TENANT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Machine-readable backoff hint for lockouts and rate limits.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::AccountLocked {
                retry_after_seconds,
            }
            | Self::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl AuthError {
    /// Classify a storage-layer failure as the retryable class, keeping
    /// the detail in the logs rather than on the wire.
    #[must_use]
    pub fn unavailable(err: anyhow::Error) -> Self {
        tracing::error!("store error: {err:#}");
        Self::Unavailable
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            tracing::error!("internal error: {err:#}");
        }
        let mut body = json!({ "error": self.error_code() });
        if let Some(retry_after) = self.retry_after_seconds() {
            if let Some(map) = body.as_object_mut() {
                map.insert("retry_after".to_string(), retry_after.into());
            }
        }
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("store error: {err}");
        Self::Unavailable
    }
}

impl From<signed_token::Error> for AuthError {
    fn from(err: signed_token::Error) -> Self {
        match err {
            signed_token::Error::Expired => Self::TokenExpired,
            _ => Self::TokenInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AuthError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::SessionNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuthError::TenantMismatch.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::AccountLocked {
                retry_after_seconds: 900
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::Unavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn lockout_carries_retry_hint() {
        let err = AuthError::AccountLocked {
            retry_after_seconds: 120,
        };
        assert_eq!(err.retry_after_seconds(), Some(120));
        assert_eq!(AuthError::InvalidCredentials.retry_after_seconds(), None);
    }

    #[test]
    fn token_errors_map_without_detail_leak() {
        let err: AuthError = signed_token::Error::Expired.into();
        assert!(matches!(err, AuthError::TokenExpired));

        let err: AuthError = signed_token::Error::InvalidSignature.into();
        assert!(matches!(err, AuthError::TokenInvalid));

        let err: AuthError = signed_token::Error::WrongKind.into();
        assert!(matches!(err, AuthError::TokenInvalid));
    }
}
