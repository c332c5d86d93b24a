//! HTTP surface: router wiring and server bootstrap.

use anyhow::{Context, Result};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

use crate::{
    authz::PermissionResolver,
    guard::{GuardPolicies, LoginGuard},
    tokens::{TokenAuthority, TokenConfig},
    totp::{SeedCipher, TotpService},
};
use handlers::auth::AuthState;
use signed_token::Keyring;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Start the server.
///
/// # Errors
/// Returns an error if the database is unreachable or the listener fails.
pub async fn new(
    port: u16,
    dsn: String,
    auth_state: Arc<AuthState>,
    keyring: Arc<Keyring>,
    token_config: TokenConfig,
    guard_policies: GuardPolicies,
    seed_cipher: SeedCipher,
) -> Result<()> {
    // Every store operation inherits these bounds; a saturated pool
    // surfaces as a retryable failure, never as a hang.
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let totp_service = TotpService::new(
        pool.clone(),
        seed_cipher,
        auth_state.config().totp_issuer().to_string(),
    );
    let guard = LoginGuard::new(pool.clone(), guard_policies);
    let authority = TokenAuthority::new(
        pool.clone(),
        keyring,
        token_config,
        auth_state.audit_handle(),
    );
    let resolver = PermissionResolver::new(pool.clone());

    let (router, _openapi) = router().split_for_parts();
    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(auth_state))
            .layer(Extension(totp_service))
            .layer(Extension(guard))
            .layer(Extension(authority))
            .layer(Extension(resolver))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
