//! First-factor login.

use std::sync::Arc;

use axum::{Json, extract::Extension, http::HeaderMap, http::header::USER_AGENT};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    audit::AuditEvent,
    error::AuthError,
    guard::{AttemptKind, AttemptOutcome, LoginGuard},
    password::VerifyOutcome,
    tokens::TokenAuthority,
};

use super::{
    AuthState, enforce_gate, issue_session_pair, mfa::MfaState, parse_ip, record_attempt, storage,
    types::{LoginRequest, LoginResponse},
    utils::extract_client_ip,
};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "First factor accepted", body = LoginResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Locked, delayed, or challenge required")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    guard: Extension<LoginGuard>,
    authority: Extension<TokenAuthority>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("missing payload"));
    };
    let tenant_id = Uuid::parse_str(request.tenant_id.trim())
        .map_err(|_| AuthError::InvalidRequest("invalid tenant id"))?;
    let identifier = request.identifier.trim();
    if identifier.is_empty() {
        return Err(AuthError::InvalidRequest("missing identifier"));
    }
    let client_ip = extract_client_ip(&headers);

    // The guard is consulted before any credential work, for every entry
    // point.
    enforce_gate(
        &guard,
        &auth_state,
        Some(tenant_id),
        identifier,
        client_ip.as_deref(),
        AttemptKind::Password,
        request.challenge_token.as_deref(),
    )
    .await?;

    let principal = storage::lookup_principal(&pool, tenant_id, identifier)
        .await
        .map_err(AuthError::unavailable)?;

    // The verifier runs its dummy-hash path on a lookup miss, so hit and
    // miss cost the same from the outside.
    let stored_hash = principal.as_ref().map(|row| row.password_hash.as_str());
    let outcome = auth_state.credentials().check(stored_hash, &request.secret);

    let principal = match (outcome, principal) {
        (VerifyOutcome::Valid, Some(row)) if row.is_active => row,
        _ => {
            record_attempt(
                &guard,
                Some(tenant_id),
                identifier,
                client_ip.as_deref(),
                AttemptKind::Password,
                AttemptOutcome::Failure,
            )
            .await;
            auth_state.audit().emit(&AuditEvent::LoginFailed {
                tenant_id,
                identifier: identifier.to_string(),
                origin_ip: parse_ip(client_ip.as_deref()),
            });
            // One generic signal for wrong secret, unknown identifier, and
            // disabled account alike.
            return Err(AuthError::InvalidCredentials);
        }
    };

    record_attempt(
        &guard,
        Some(tenant_id),
        identifier,
        client_ip.as_deref(),
        AttemptKind::Password,
        AttemptOutcome::Success,
    )
    .await;

    // MFA state picks the one-phase vs two-phase path, resolved once here.
    match principal.mfa_state() {
        MfaState::Enabled => {
            let (step_up_token, step_up_expires_at) =
                authority.issue_step_up(principal.id, tenant_id)?;
            Ok(Json(LoginResponse {
                mfa_required: true,
                step_up_token: Some(step_up_token),
                step_up_expires_at: Some(step_up_expires_at),
                tokens: None,
            }))
        }
        MfaState::Disabled => {
            let user_agent = headers
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let pair = issue_session_pair(
                &pool,
                &auth_state,
                &authority,
                principal.id,
                tenant_id,
                client_ip.as_deref(),
                user_agent.as_deref(),
            )
            .await?;
            auth_state.audit().emit(&AuditEvent::LoginSucceeded {
                tenant_id,
                principal_id: principal.id,
                origin_ip: parse_ip(client_ip.as_deref()),
            });
            Ok(Json(LoginResponse {
                mfa_required: false,
                step_up_token: None,
                step_up_expires_at: None,
                tokens: Some(pair.into()),
            }))
        }
    }
}
