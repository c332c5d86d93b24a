//! Refresh-token rotation.

use axum::{Json, extract::Extension};

use crate::{error::AuthError, tokens::TokenAuthority};

use super::types::{RefreshRequest, TokenPairResponse};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated", body = TokenPairResponse),
        (status = 401, description = "Expired, invalid, or replay-detected")
    ),
    tag = "auth"
)]
pub async fn refresh(
    authority: Extension<TokenAuthority>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidRequest("missing payload"));
    };
    // Replay detection and the family-wide revocation it triggers live in
    // the token authority; the handler only relays the verdict.
    let pair = authority.rotate(request.refresh_token.trim()).await?;
    Ok(Json(pair.into()))
}
