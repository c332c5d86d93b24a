//! Security audit events.
//!
//! The core emits events; their persistence and retention belong to an
//! external collaborator, so the only contract here is the sink trait.
//! The default sink writes structured records to the `audit` tracing
//! target, which operators can route wherever the audit pipeline ingests.

use std::net::IpAddr;
use uuid::Uuid;

/// Events worth an operator's attention.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    LoginSucceeded {
        tenant_id: Uuid,
        principal_id: Uuid,
        origin_ip: Option<IpAddr>,
    },
    LoginFailed {
        tenant_id: Uuid,
        identifier: String,
        origin_ip: Option<IpAddr>,
    },
    LockoutTriggered {
        tenant_id: Option<Uuid>,
        identifier: String,
        origin_ip: Option<IpAddr>,
    },
    /// A refresh token was presented twice. Treated as evidence of theft;
    /// the whole token family has been revoked by the time this fires.
    TokenReplayDetected {
        tenant_id: Uuid,
        principal_id: Uuid,
        jti: Uuid,
        sessions_revoked: u64,
    },
    MfaEnabled {
        tenant_id: Uuid,
        principal_id: Uuid,
    },
    MfaDisabled {
        tenant_id: Uuid,
        principal_id: Uuid,
    },
    MfaVerificationFailed {
        tenant_id: Uuid,
        principal_id: Uuid,
        origin_ip: Option<IpAddr>,
    },
    /// Recovery-code use signals probable loss of the primary device.
    RecoveryCodeUsed {
        tenant_id: Uuid,
        principal_id: Uuid,
        remaining_codes: u64,
    },
    SessionTerminated {
        tenant_id: Uuid,
        principal_id: Uuid,
        session_id: Uuid,
    },
    AllSessionsTerminated {
        tenant_id: Uuid,
        principal_id: Uuid,
        sessions_revoked: u64,
    },
}

impl AuditEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginSucceeded { .. } => "login_succeeded",
            Self::LoginFailed { .. } => "login_failed",
            Self::LockoutTriggered { .. } => "lockout_triggered",
            Self::TokenReplayDetected { .. } => "token_replay_detected",
            Self::MfaEnabled { .. } => "mfa_enabled",
            Self::MfaDisabled { .. } => "mfa_disabled",
            Self::MfaVerificationFailed { .. } => "mfa_verification_failed",
            Self::RecoveryCodeUsed { .. } => "recovery_code_used",
            Self::SessionTerminated { .. } => "session_terminated",
            Self::AllSessionsTerminated { .. } => "all_sessions_terminated",
        }
    }

    /// Events that should page someone rather than just be recorded.
    #[must_use]
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Self::TokenReplayDetected { .. }
                | Self::LockoutTriggered { .. }
                | Self::RecoveryCodeUsed { .. }
        )
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Default sink: structured records on the `audit` tracing target.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if event.is_alert() {
            tracing::warn!(target: "audit", event = event.name(), detail = ?event, alert = true);
        } else {
            tracing::info!(target: "audit", event = event.name(), detail = ?event, alert = false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_and_recovery_are_alerts() {
        let replay = AuditEvent::TokenReplayDetected {
            tenant_id: Uuid::nil(),
            principal_id: Uuid::nil(),
            jti: Uuid::nil(),
            sessions_revoked: 3,
        };
        assert!(replay.is_alert());
        assert_eq!(replay.name(), "token_replay_detected");

        let recovery = AuditEvent::RecoveryCodeUsed {
            tenant_id: Uuid::nil(),
            principal_id: Uuid::nil(),
            remaining_codes: 9,
        };
        assert!(recovery.is_alert());
    }

    #[test]
    fn routine_events_are_not_alerts() {
        let login = AuditEvent::LoginSucceeded {
            tenant_id: Uuid::nil(),
            principal_id: Uuid::nil(),
            origin_ip: None,
        };
        assert!(!login.is_alert());
    }

    #[test]
    fn tracing_sink_accepts_all_events() {
        let sink = TracingAuditSink;
        sink.emit(&AuditEvent::MfaEnabled {
            tenant_id: Uuid::nil(),
            principal_id: Uuid::nil(),
        });
    }
}
