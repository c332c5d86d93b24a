use super::handlers::{auth, health};
use utoipa::openapi::{InfoBuilder, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the router wiring and only return the generated spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both
/// served and documented. Handlers on the same path share one `routes!`
/// invocation.
pub(crate) fn api_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::mfa::verify))
        .routes(routes!(auth::refresh::refresh))
        .routes(routes!(auth::session::logout))
        .routes(routes!(
            auth::session::list_sessions,
            auth::session::terminate_all_sessions
        ))
        .routes(routes!(auth::session::terminate_session))
        .routes(routes!(auth::mfa::enroll_start))
        .routes(routes!(auth::mfa::enroll_finish))
        .routes(routes!(auth::mfa::disable))
        .routes(routes!(auth::authorize::authorize))
        .routes(routes!(auth::authorize::list_permissions))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut service_tag = Tag::new("tessera");
    service_tag.description = Some("Authentication and session core".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, step-up, refresh, logout".to_string());

    let mut sessions_tag = Tag::new("sessions");
    sessions_tag.description = Some("Multi-device session management".to_string());

    let mut mfa_tag = Tag::new("mfa");
    mfa_tag.description = Some("TOTP enrollment and recovery codes".to_string());

    let mut authz_tag = Tag::new("authz");
    authz_tag.description = Some("Tenant-scoped permission resolution".to_string());

    let info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    OpenApiBuilder::new()
        .info(info)
        .tags(Some(vec![
            service_tag,
            auth_tag,
            sessions_tag,
            mfa_tag,
            authz_tag,
        ]))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn all_documented_routes_are_registered() {
        let spec = openapi();
        let paths = &spec.paths.paths;
        for expected in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/mfa/verify",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/sessions",
            "/v1/auth/sessions/{session_id}",
            "/v1/auth/mfa/enroll/start",
            "/v1/auth/mfa/enroll/finish",
            "/v1/auth/mfa/disable",
            "/v1/auth/authorize",
            "/v1/auth/permissions",
        ] {
            assert!(paths.contains_key(expected), "missing route: {expected}");
        }
    }
}
