//! MFA step-up endpoints.
//!
//! Flow overview:
//! 1) First factor succeeds with MFA enabled -> the caller holds a
//!    step-up token (5-minute TTL, useless for resource access).
//! 2) `POST /v1/auth/mfa/verify` takes that token plus a live TOTP code
//!    or a one-time recovery code, behind the tighter second-factor guard
//!    ladder, and mints the full pair.
//! 3) Enrollment proves possession with a live code before the credential
//!    is enabled; the recovery batch is returned exactly once.
//! 4) Disabling MFA requires re-proving the current password.

pub mod recovery;
pub mod storage;

use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::USER_AGENT},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    audit::AuditEvent,
    error::AuthError,
    guard::{AttemptKind, AttemptOutcome, LoginGuard},
    password::VerifyOutcome,
    tokens::{StepUpContext, TokenAuthority},
    totp::TotpService,
};

use super::{
    AuthState, enforce_gate, issue_session_pair, parse_ip, record_attempt, storage as principal_storage,
    principal::require_access,
    types::{
        MfaDisableRequest, MfaEnrollFinishRequest, MfaEnrollFinishResponse, MfaEnrollStartResponse,
        MfaVerifyRequest, TokenPairResponse,
    },
    utils::extract_client_ip,
};

/// Explicit MFA state on the principal, resolved once at first-factor
/// time to pick the one-phase vs two-phase login path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MfaState {
    Disabled,
    Enabled,
}

impl MfaState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "disabled" => Some(Self::Disabled),
            "enabled" => Some(Self::Enabled),
            _ => None,
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "Second factor accepted", body = TokenPairResponse),
        (status = 401, description = "Invalid step-up token or code"),
        (status = 429, description = "Locked or rate limited")
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    guard: Extension<LoginGuard>,
    authority: Extension<TokenAuthority>,
    totp: Extension<TotpService>,
    payload: Option<Json<MfaVerifyRequest>>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("missing payload"));
    };
    let step_up = authority.verify_step_up(request.step_up_token.trim())?;
    let client_ip = extract_client_ip(&headers);

    // Own, tighter ladder for the second factor, keyed by principal id.
    let gate_key = step_up.principal_id.to_string();
    enforce_gate(
        &guard,
        &auth_state,
        Some(step_up.tenant_id),
        &gate_key,
        client_ip.as_deref(),
        AttemptKind::Mfa,
        request.challenge_token.as_deref(),
    )
    .await?;

    let principal =
        principal_storage::get_principal(&pool, step_up.principal_id, step_up.tenant_id)
            .await
            .map_err(AuthError::unavailable)?
            .filter(|row| row.is_active)
            .ok_or(AuthError::InvalidCredentials)?;
    if principal.mfa_state() != MfaState::Enabled {
        return Err(AuthError::InvalidMfaCode);
    }

    let verified = if let Some(code) = request.code.as_deref() {
        totp.verify(step_up.principal_id, step_up.tenant_id, code)
            .await
            .map_err(AuthError::unavailable)?
    } else if let Some(recovery_code) = request.recovery_code.as_deref() {
        consume_recovery_code(&pool, &auth_state, &step_up, recovery_code).await?
    } else {
        return Err(AuthError::InvalidRequest("missing code"));
    };

    if !verified {
        record_attempt(
            &guard,
            Some(step_up.tenant_id),
            &gate_key,
            client_ip.as_deref(),
            AttemptKind::Mfa,
            AttemptOutcome::Failure,
        )
        .await;
        auth_state.audit().emit(&AuditEvent::MfaVerificationFailed {
            tenant_id: step_up.tenant_id,
            principal_id: step_up.principal_id,
            origin_ip: parse_ip(client_ip.as_deref()),
        });
        return Err(AuthError::InvalidMfaCode);
    }

    record_attempt(
        &guard,
        Some(step_up.tenant_id),
        &gate_key,
        client_ip.as_deref(),
        AttemptKind::Mfa,
        AttemptOutcome::Success,
    )
    .await;

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let pair = issue_session_pair(
        &pool,
        &auth_state,
        &authority,
        step_up.principal_id,
        step_up.tenant_id,
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await?;

    auth_state.audit().emit(&AuditEvent::LoginSucceeded {
        tenant_id: step_up.tenant_id,
        principal_id: step_up.principal_id,
        origin_ip: parse_ip(client_ip.as_deref()),
    });
    Ok(Json(pair.into()))
}

/// Recovery path: find a matching unused code, consume it atomically, and
/// raise the side-channel alert. A spent code and a wrong code are the
/// same `false` from out here.
async fn consume_recovery_code(
    pool: &PgPool,
    auth_state: &Arc<AuthState>,
    step_up: &StepUpContext,
    presented: &str,
) -> Result<bool, AuthError> {
    let hashes = storage::list_unused_hashes(pool, step_up.principal_id)
        .await
        .map_err(AuthError::unavailable)?;

    let mut matched = None;
    for hash in &hashes {
        if recovery::verify_recovery_code(presented, hash, auth_state.recovery_pepper())
            .unwrap_or(false)
        {
            matched = Some(hash.clone());
            break;
        }
    }
    let Some(matched) = matched else {
        return Ok(false);
    };

    let consumed = storage::consume_recovery_code(pool, step_up.principal_id, &matched)
        .await
        .map_err(AuthError::unavailable)?;
    if !consumed {
        return Ok(false);
    }

    let remaining = storage::count_unused(pool, step_up.principal_id)
        .await
        .unwrap_or(0);
    auth_state.audit().emit(&AuditEvent::RecoveryCodeUsed {
        tenant_id: step_up.tenant_id,
        principal_id: step_up.principal_id,
        remaining_codes: remaining,
    });
    Ok(true)
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/enroll/start",
    responses(
        (status = 200, description = "Enrollment material", body = MfaEnrollStartResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "mfa"
)]
pub async fn enroll_start(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    authority: Extension<TokenAuthority>,
    totp: Extension<TotpService>,
) -> Result<Json<MfaEnrollStartResponse>, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    let principal = principal_storage::get_principal(&pool, ctx.principal_id, ctx.tenant_id)
        .await
        .map_err(AuthError::unavailable)?
        .ok_or(AuthError::TokenInvalid)?;

    let enrollment = totp
        .enroll_begin(ctx.principal_id, ctx.tenant_id, &principal.identifier)
        .await
        .map_err(AuthError::unavailable)?;

    Ok(Json(MfaEnrollStartResponse {
        credential_id: enrollment.credential_id.to_string(),
        secret: enrollment.secret_base32,
        otpauth_url: enrollment.otpauth_url,
        qr_data_url: enrollment.qr_data_url,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/enroll/finish",
    request_body = MfaEnrollFinishRequest,
    responses(
        (status = 200, description = "MFA enabled; recovery codes returned once", body = MfaEnrollFinishResponse),
        (status = 401, description = "Invalid code or unauthorized")
    ),
    tag = "mfa"
)]
pub async fn enroll_finish(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    authority: Extension<TokenAuthority>,
    totp: Extension<TotpService>,
    payload: Option<Json<MfaEnrollFinishRequest>>,
) -> Result<Json<MfaEnrollFinishResponse>, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("missing payload"));
    };
    let credential_id = Uuid::parse_str(request.credential_id.trim())
        .map_err(|_| AuthError::InvalidRequest("invalid credential id"))?;

    let confirmed = totp
        .enroll_confirm(ctx.principal_id, ctx.tenant_id, credential_id, &request.code)
        .await
        .map_err(AuthError::unavailable)?;
    if !confirmed {
        return Err(AuthError::InvalidMfaCode);
    }

    let batch = recovery::RecoveryCodeBatch::generate(auth_state.recovery_pepper())
        .map_err(AuthError::unavailable)?;
    storage::replace_recovery_codes(&pool, ctx.principal_id, batch.batch_id, &batch.code_hashes)
        .await
        .map_err(AuthError::unavailable)?;

    principal_storage::set_mfa_state(&pool, ctx.principal_id, ctx.tenant_id, MfaState::Enabled)
        .await
        .map_err(AuthError::unavailable)?;

    auth_state.audit().emit(&AuditEvent::MfaEnabled {
        tenant_id: ctx.tenant_id,
        principal_id: ctx.principal_id,
    });

    Ok(Json(MfaEnrollFinishResponse {
        recovery_codes: batch.codes,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/disable",
    request_body = MfaDisableRequest,
    responses(
        (status = 204, description = "MFA disabled"),
        (status = 401, description = "Password re-proof failed")
    ),
    tag = "mfa"
)]
pub async fn disable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    authority: Extension<TokenAuthority>,
    totp: Extension<TotpService>,
    payload: Option<Json<MfaDisableRequest>>,
) -> Result<StatusCode, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("missing payload"));
    };

    let principal = principal_storage::get_principal(&pool, ctx.principal_id, ctx.tenant_id)
        .await
        .map_err(AuthError::unavailable)?
        .filter(|row| row.is_active)
        .ok_or(AuthError::TokenInvalid)?;

    // Holding a valid access token is not enough to drop the second
    // factor; the current password must be re-proven.
    let outcome = auth_state
        .credentials()
        .check(Some(&principal.password_hash), &request.secret);
    if outcome != VerifyOutcome::Valid {
        return Err(AuthError::InvalidCredentials);
    }

    totp.disable(ctx.principal_id)
        .await
        .map_err(AuthError::unavailable)?;
    storage::delete_for_principal(&pool, ctx.principal_id)
        .await
        .map_err(AuthError::unavailable)?;
    principal_storage::set_mfa_state(&pool, ctx.principal_id, ctx.tenant_id, MfaState::Disabled)
        .await
        .map_err(AuthError::unavailable)?;

    auth_state.audit().emit(&AuditEvent::MfaDisabled {
        tenant_id: ctx.tenant_id,
        principal_id: ctx.principal_id,
    });
    Ok(StatusCode::NO_CONTENT)
}
