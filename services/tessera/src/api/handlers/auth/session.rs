//! Logout and multi-device session management.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    audit::AuditEvent,
    error::AuthError,
    sessions,
    tokens::TokenAuthority,
};

use super::{
    AuthState,
    principal::require_access,
    types::{LogoutRequest, LogoutScope, SessionListResponse, SessionResponse, TerminateAllResponse},
};

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    authority: Extension<TokenAuthority>,
    payload: Option<Json<LogoutRequest>>,
) -> Result<StatusCode, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    let scope = payload.map(|Json(request)| request.scope).unwrap_or_default();
    authority
        .logout(&ctx, scope == LogoutScope::All)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Live sessions for the principal", body = SessionListResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "sessions"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    authority: Extension<TokenAuthority>,
) -> Result<Json<SessionListResponse>, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    let rows = sessions::repo::list_sessions(&pool, ctx.principal_id, ctx.tenant_id)
        .await
        .map_err(AuthError::unavailable)?;
    let sessions = rows
        .into_iter()
        .map(|row| SessionResponse {
            session_id: row.id.to_string(),
            created_at: row.created_at,
            absolute_expires_at: row.absolute_expires_at,
            last_seen_at: row.last_seen_at,
            origin_ip: row.origin_ip,
            user_agent: row.user_agent,
        })
        .collect();
    Ok(Json(SessionListResponse { sessions }))
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session to terminate")),
    responses(
        (status = 204, description = "Terminated"),
        (status = 404, description = "No such session for this principal"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "sessions"
)]
pub async fn terminate_session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    authority: Extension<TokenAuthority>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    // Malformed ids get the same answer as ids owned by someone else:
    // nothing to enumerate.
    let session_id = Uuid::parse_str(session_id.trim()).map_err(|_| AuthError::SessionNotFound)?;

    let terminated =
        sessions::repo::terminate_session(&pool, session_id, ctx.principal_id, ctx.tenant_id)
            .await
            .map_err(AuthError::unavailable)?;
    if !terminated {
        return Err(AuthError::SessionNotFound);
    }

    auth_state.audit().emit(&AuditEvent::SessionTerminated {
        tenant_id: ctx.tenant_id,
        principal_id: ctx.principal_id,
        session_id,
    });
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "All sessions terminated", body = TerminateAllResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "sessions"
)]
pub async fn terminate_all_sessions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    authority: Extension<TokenAuthority>,
) -> Result<Json<TerminateAllResponse>, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    let revoked = sessions::repo::terminate_all(&pool, ctx.principal_id, ctx.tenant_id)
        .await
        .map_err(AuthError::unavailable)?;
    auth_state.audit().emit(&AuditEvent::AllSessionsTerminated {
        tenant_id: ctx.tenant_id,
        principal_id: ctx.principal_id,
        sessions_revoked: revoked,
    });
    Ok(Json(TerminateAllResponse { revoked }))
}
