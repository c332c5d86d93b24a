//! Authenticated principal extraction.
//!
//! Every authorized request goes through `require_access`: bearer token
//! verified end to end (signature, expiry, deny-list, live session), then
//! the explicit tenant header checked against the token's tenant claim.
//! A missing tenant header is a hard error, never a default.

use axum::http::HeaderMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AuthError,
    sessions,
    tokens::{AccessContext, TokenAuthority},
};

use super::utils::{TENANT_HEADER, extract_bearer_token};

/// Parse the mandatory tenant-context header.
///
/// # Errors
/// Returns `MissingTenant` when absent, `InvalidRequest` when malformed.
pub fn tenant_header(headers: &HeaderMap) -> Result<Uuid, AuthError> {
    let value = headers.get(TENANT_HEADER).ok_or(AuthError::MissingTenant)?;
    let text = value.to_str().map_err(|_| AuthError::MissingTenant)?;
    Uuid::parse_str(text.trim()).map_err(|_| AuthError::InvalidRequest("invalid tenant id"))
}

/// Resolve the request to a verified access context.
///
/// # Errors
/// Returns the token-verification failure, `MissingTenant`, or
/// `TenantMismatch` when the header disagrees with the token's claim.
pub async fn require_access(
    headers: &HeaderMap,
    authority: &TokenAuthority,
    pool: &PgPool,
) -> Result<AccessContext, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::TokenInvalid)?;
    let ctx = authority.verify_access(&token).await?;

    let requested_tenant = tenant_header(headers)?;
    if requested_tenant != ctx.tenant_id {
        return Err(AuthError::TenantMismatch);
    }

    // Visibility only; the session's absolute expiry does not move.
    if let Err(err) =
        sessions::repo::touch_last_seen(pool, ctx.session_id, ctx.principal_id, ctx.tenant_id).await
    {
        tracing::warn!("failed to record session activity: {err:#}");
    }

    Ok(ctx)
}
