//! Brute-force defense for the authentication entry points.
//!
//! Two independent escalation ladders run over the append-only
//! `login_attempts` table: one keyed by (tenant, identifier) counting
//! consecutive failures (reset by success), one keyed by origin address
//! counting failures in a sliding window (not reset by success, since one
//! address may attack many identifiers). The second-factor endpoint gets
//! its own tighter ladder because a 6-digit code space is tiny compared to
//! a password space.
//!
//! The ladder math lives in `ladder.rs` as a pure function; `service.rs`
//! feeds it attempt samples from Postgres, which is what makes the
//! counters correct across service instances.

pub mod ladder;
pub mod service;

pub use ladder::{AttemptSample, GuardState, LadderPolicy};
pub use service::{AttemptKind, AttemptOutcome, ChallengeVerifier, GuardPolicies, LoginGuard, NoopChallengeVerifier};
