//! Authentication endpoints and their shared plumbing.
//!
//! Flow overview:
//! 1) `POST /v1/auth/login` checks the guard, then the first factor. With
//!    MFA disabled it returns a full token pair; with MFA enabled it
//!    returns a short-lived step-up token instead.
//! 2) `POST /v1/auth/mfa/verify` finishes the second factor (TOTP or
//!    recovery code) under its own tighter guard ladder and mints the pair.
//! 3) `POST /v1/auth/refresh` rotates the pair; reuse of a refresh token
//!    revokes the whole family.
//! 4) Session and MFA management endpoints require a verified access
//!    token plus the explicit tenant header.

pub mod authorize;
pub mod login;
pub mod mfa;
pub mod principal;
pub mod refresh;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;
pub mod utils;

use std::net::IpAddr;
use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    audit::AuditEvent,
    error::AuthError,
    guard::{AttemptKind, AttemptOutcome, GuardState, LoginGuard},
    sessions,
    tokens::{TokenAuthority, TokenPair},
};

pub use state::{AuthConfig, AuthState};

/// Apply the guard's verdict for an attempt about to happen. `Challenge`
/// is satisfiable by a valid challenge token; `Delay` and `Locked` reject
/// with machine-readable retry hints (no server-side sleeping: a handler
/// that naps holds a pool slot).
pub(crate) async fn enforce_gate(
    guard: &LoginGuard,
    auth_state: &AuthState,
    tenant_id: Option<Uuid>,
    identifier: &str,
    origin_ip: Option<&str>,
    kind: AttemptKind,
    challenge_token: Option<&str>,
) -> Result<(), AuthError> {
    let state = guard
        .gate(tenant_id, identifier, origin_ip, kind)
        .await
        .map_err(AuthError::unavailable)?;

    match state {
        GuardState::Normal => Ok(()),
        GuardState::Challenge => match challenge_token {
            Some(token) if auth_state.challenge().verify(token) => Ok(()),
            _ => Err(AuthError::ChallengeRequired),
        },
        GuardState::Delay { retry_after } => Err(AuthError::RateLimited {
            retry_after_seconds: as_retry_seconds(retry_after),
        }),
        GuardState::Locked { retry_after } => {
            record_attempt(
                guard,
                tenant_id,
                identifier,
                origin_ip,
                kind,
                AttemptOutcome::Locked,
            )
            .await;
            auth_state.audit().emit(&AuditEvent::LockoutTriggered {
                tenant_id,
                identifier: identifier.to_string(),
                origin_ip: parse_ip(origin_ip),
            });
            Err(AuthError::AccountLocked {
                retry_after_seconds: as_retry_seconds(retry_after),
            })
        }
    }
}

/// Append an attempt record, logging rather than failing the request if
/// the insert itself goes down.
pub(crate) async fn record_attempt(
    guard: &LoginGuard,
    tenant_id: Option<Uuid>,
    identifier: &str,
    origin_ip: Option<&str>,
    kind: AttemptKind,
    outcome: AttemptOutcome,
) {
    if let Err(err) = guard
        .record(tenant_id, identifier, origin_ip, kind, outcome)
        .await
    {
        tracing::error!("failed to record login attempt: {err:#}");
    }
}

/// Create the session and bind a fresh token pair to it: the final step
/// of both the one-phase and two-phase login paths.
pub(crate) async fn issue_session_pair(
    pool: &PgPool,
    auth_state: &Arc<AuthState>,
    authority: &TokenAuthority,
    principal_id: Uuid,
    tenant_id: Uuid,
    origin_ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<TokenPair, AuthError> {
    let session = sessions::repo::create_session(
        pool,
        principal_id,
        tenant_id,
        origin_ip,
        user_agent,
        auth_state.config().session_ttl(),
    )
    .await
    .map_err(AuthError::unavailable)?;

    authority.issue_pair(principal_id, tenant_id, session.id).await
}

pub(crate) fn parse_ip(origin_ip: Option<&str>) -> Option<IpAddr> {
    origin_ip.and_then(|ip| ip.parse().ok())
}

pub(crate) fn as_retry_seconds(duration: chrono::Duration) -> u64 {
    u64::try_from(duration.num_seconds()).unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_seconds_never_report_zero() {
        assert_eq!(as_retry_seconds(chrono::Duration::milliseconds(200)), 1);
        assert_eq!(as_retry_seconds(chrono::Duration::seconds(90)), 90);
        assert_eq!(as_retry_seconds(chrono::Duration::seconds(-5)), 1);
    }

    #[test]
    fn parse_ip_tolerates_garbage() {
        assert!(parse_ip(Some("10.0.0.1")).is_some());
        assert!(parse_ip(Some("not-an-ip")).is_none());
        assert!(parse_ip(None).is_none());
    }
}
