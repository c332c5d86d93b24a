//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::tokens::TokenPair;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub tenant_id: String,
    pub identifier: String,
    pub secret: String,
    /// Response to a guard-issued challenge, when one was demanded.
    #[serde(default)]
    pub challenge_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            session_id: pair.session_id.to_string(),
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

/// First-factor outcome: either the full pair, or the step-up gate.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub mfa_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_up_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_up_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPairResponse>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaVerifyRequest {
    pub step_up_token: String,
    /// A live TOTP code...
    #[serde(default)]
    pub code: Option<String>,
    /// ...or a one-time recovery code.
    #[serde(default)]
    pub recovery_code: Option<String>,
    #[serde(default)]
    pub challenge_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogoutScope {
    #[default]
    One,
    All,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub scope: LogoutScope,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub absolute_expires_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TerminateAllResponse {
    pub revoked: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaEnrollStartResponse {
    pub credential_id: String,
    pub secret: String,
    pub otpauth_url: String,
    pub qr_data_url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaEnrollFinishRequest {
    pub credential_id: String,
    pub code: String,
}

/// Recovery codes are returned exactly once, at enrollment.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaEnrollFinishResponse {
    pub recovery_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaDisableRequest {
    /// Disabling the second factor requires re-proving the first.
    pub secret: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthorizeRequest {
    pub tenant_id: String,
    pub permission: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthorizeResponse {
    pub allowed: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PermissionListResponse {
    pub superuser: bool,
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_response_omits_absent_halves() -> anyhow::Result<()> {
        let response = LoginResponse {
            mfa_required: true,
            step_up_token: Some("token".to_string()),
            step_up_expires_at: None,
            tokens: None,
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(value.get("mfa_required"), Some(&serde_json::json!(true)));
        assert!(value.get("tokens").is_none());
        Ok(())
    }

    #[test]
    fn logout_scope_defaults_to_one() -> anyhow::Result<()> {
        let request: LogoutRequest = serde_json::from_str("{}")?;
        assert_eq!(request.scope, LogoutScope::One);
        let request: LogoutRequest = serde_json::from_str(r#"{"scope":"all"}"#)?;
        assert_eq!(request.scope, LogoutScope::All);
        Ok(())
    }

    #[test]
    fn login_request_round_trips() -> anyhow::Result<()> {
        let request = LoginRequest {
            tenant_id: "t".to_string(),
            identifier: "alice".to_string(),
            secret: "s".to_string(),
            challenge_token: None,
        };
        let value = serde_json::to_value(&request)?;
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.identifier, "alice");
        Ok(())
    }
}
