//! Permission checks for collaborators.

use axum::{
    Json,
    extract::Extension,
    http::HeaderMap,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{authz::PermissionResolver, error::AuthError, tokens::TokenAuthority};

use super::{
    principal::require_access,
    types::{AuthorizeRequest, AuthorizeResponse, PermissionListResponse},
};

#[utoipa::path(
    post,
    path = "/v1/auth/authorize",
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Decision", body = AuthorizeResponse),
        (status = 403, description = "Tenant mismatch"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "authz"
)]
pub async fn authorize(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    authority: Extension<TokenAuthority>,
    resolver: Extension<PermissionResolver>,
    payload: Option<Json<AuthorizeRequest>>,
) -> Result<Json<AuthorizeResponse>, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("missing payload"));
    };
    let requested_tenant = Uuid::parse_str(request.tenant_id.trim())
        .map_err(|_| AuthError::InvalidRequest("invalid tenant id"))?;

    // The resolver enforces the tenant boundary itself; a cross-tenant
    // request dies there whether or not the target tenant exists.
    let permissions = resolver
        .resolve(ctx.principal_id, ctx.tenant_id, requested_tenant)
        .await?;

    Ok(Json(AuthorizeResponse {
        allowed: permissions.allows(request.permission.trim()),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/auth/permissions",
    responses(
        (status = 200, description = "Effective permissions", body = PermissionListResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "authz"
)]
pub async fn list_permissions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    authority: Extension<TokenAuthority>,
    resolver: Extension<PermissionResolver>,
) -> Result<Json<PermissionListResponse>, AuthError> {
    let ctx = require_access(&headers, &authority, &pool).await?;
    let permissions = resolver
        .resolve(ctx.principal_id, ctx.tenant_id, ctx.tenant_id)
        .await?;
    Ok(Json(PermissionListResponse {
        superuser: permissions.is_superuser(),
        permissions: permissions.codes(),
    }))
}
