//! Postgres-backed guard aggregation.
//!
//! Every service instance reads and appends the same `login_attempts`
//! table, so the ladders stay correct under horizontal scaling. Attempts
//! rejected while locked are recorded with outcome `locked`; they are
//! visible to operators but excluded from ladder input, which is what
//! keeps a lock from extending itself.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::ladder::{self, AttemptSample, GuardState, LadderPolicy};

/// How many recent attempts the ladder looks at per key. Anything deeper
/// than the lock threshold plus hammering noise is irrelevant.
const SAMPLE_LIMIT: i64 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptKind {
    Password,
    Mfa,
}

impl AttemptKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Mfa => "mfa",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
    /// Rejected by the guard itself while locked.
    Locked,
}

impl AttemptOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Locked => "locked",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GuardPolicies {
    pub password: LadderPolicy,
    pub second_factor: LadderPolicy,
}

impl Default for GuardPolicies {
    fn default() -> Self {
        Self {
            password: LadderPolicy::password(),
            second_factor: LadderPolicy::second_factor(),
        }
    }
}

/// Verifies challenge responses when the ladder demands one. CAPTCHA
/// provisioning is an external collaborator; deployments plug their
/// verifier here.
pub trait ChallengeVerifier: Send + Sync {
    fn verify(&self, challenge_token: &str) -> bool;
}

/// Accepts any non-empty challenge token. Placeholder for deployments
/// without a CAPTCHA provider.
#[derive(Clone, Debug, Default)]
pub struct NoopChallengeVerifier;

impl ChallengeVerifier for NoopChallengeVerifier {
    fn verify(&self, challenge_token: &str) -> bool {
        !challenge_token.trim().is_empty()
    }
}

#[derive(Clone)]
pub struct LoginGuard {
    pool: PgPool,
    policies: GuardPolicies,
}

impl LoginGuard {
    #[must_use]
    pub fn new(pool: PgPool, policies: GuardPolicies) -> Self {
        Self { pool, policies }
    }

    fn policy(&self, kind: AttemptKind) -> &LadderPolicy {
        match kind {
            AttemptKind::Password => &self.policies.password,
            AttemptKind::Mfa => &self.policies.second_factor,
        }
    }

    /// Evaluate both ladders for an attempt about to happen. The harsher
    /// state wins.
    ///
    /// # Errors
    /// Returns an error if the attempt store cannot be read.
    pub async fn gate(
        &self,
        tenant_id: Option<Uuid>,
        identifier: &str,
        origin_ip: Option<&str>,
        kind: AttemptKind,
    ) -> Result<GuardState> {
        let now = Utc::now();
        let policy = self.policy(kind);

        let identifier_samples = self
            .identifier_samples(tenant_id, identifier, kind, policy.window)
            .await?;
        let mut state = ladder::evaluate_identifier(&identifier_samples, now, policy);

        if let Some(ip) = origin_ip {
            let origin_samples = self.origin_samples(ip, kind, policy.window).await?;
            state = state.worst(ladder::evaluate_origin(&origin_samples, now, policy));
        }

        Ok(state)
    }

    /// Append an attempt record. Called for every outcome, including
    /// guard-rejected ones, so the audit trail stays complete.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn record(
        &self,
        tenant_id: Option<Uuid>,
        identifier: &str,
        origin_ip: Option<&str>,
        kind: AttemptKind,
        outcome: AttemptOutcome,
    ) -> Result<()> {
        let query = r"
            INSERT INTO login_attempts (tenant_id, identifier, origin_ip, kind, outcome)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(tenant_id)
            .bind(identifier)
            .bind(origin_ip)
            .bind(kind.as_str())
            .bind(outcome.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login attempt")?;
        Ok(())
    }

    /// Delete attempts older than the retention window. Owned by the
    /// maintenance job; exposed here so it shares the table's definition.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn prune(&self, retain: Duration) -> Result<u64> {
        let query = r"
            DELETE FROM login_attempts
            WHERE created_at < NOW() - ($1 * INTERVAL '1 second')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(retain.num_seconds())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to prune login attempts")?;
        Ok(result.rows_affected())
    }

    async fn identifier_samples(
        &self,
        tenant_id: Option<Uuid>,
        identifier: &str,
        kind: AttemptKind,
        window: Duration,
    ) -> Result<Vec<AttemptSample>> {
        let query = r"
            SELECT outcome, created_at
            FROM login_attempts
            WHERE tenant_id IS NOT DISTINCT FROM $1
              AND identifier = $2
              AND kind = $3
              AND outcome IN ('success', 'failure')
              AND created_at > NOW() - ($4 * INTERVAL '1 second')
            ORDER BY created_at DESC
            LIMIT $5
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(tenant_id)
            .bind(identifier)
            .bind(kind.as_str())
            .bind(window.num_seconds())
            .bind(SAMPLE_LIMIT)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load identifier attempts")?;
        Ok(rows.iter().map(row_to_sample).collect())
    }

    async fn origin_samples(
        &self,
        origin_ip: &str,
        kind: AttemptKind,
        window: Duration,
    ) -> Result<Vec<AttemptSample>> {
        let query = r"
            SELECT outcome, created_at
            FROM login_attempts
            WHERE origin_ip = $1
              AND kind = $2
              AND outcome IN ('success', 'failure')
              AND created_at > NOW() - ($3 * INTERVAL '1 second')
            ORDER BY created_at DESC
            LIMIT $4
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(origin_ip)
            .bind(kind.as_str())
            .bind(window.num_seconds())
            .bind(SAMPLE_LIMIT)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load origin attempts")?;
        Ok(rows.iter().map(row_to_sample).collect())
    }
}

fn row_to_sample(row: &sqlx::postgres::PgRow) -> AttemptSample {
    let outcome: String = row.get("outcome");
    let at: DateTime<Utc> = row.get("created_at");
    AttemptSample {
        failed: outcome == "failure",
        at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_kinds_and_outcomes_serialize_stably() {
        assert_eq!(AttemptKind::Password.as_str(), "password");
        assert_eq!(AttemptKind::Mfa.as_str(), "mfa");
        assert_eq!(AttemptOutcome::Success.as_str(), "success");
        assert_eq!(AttemptOutcome::Failure.as_str(), "failure");
        assert_eq!(AttemptOutcome::Locked.as_str(), "locked");
    }

    #[test]
    fn default_policies_keep_mfa_tighter() {
        let policies = GuardPolicies::default();
        assert!(policies.second_factor.lock_after < policies.password.lock_after);
    }

    #[test]
    fn noop_challenge_verifier_requires_a_token() {
        let verifier = NoopChallengeVerifier;
        assert!(verifier.verify("any-token"));
        assert!(!verifier.verify("   "));
        assert!(!verifier.verify(""));
    }
}
