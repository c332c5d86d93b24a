//! Principal lookup and mutation helpers.

use anyhow::{Context, Result};
use sqlx::{FromRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::mfa::MfaState;

#[derive(Debug, Clone, FromRow)]
pub struct PrincipalRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub identifier: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_superuser: bool,
    pub mfa_state: String,
}

impl PrincipalRow {
    #[must_use]
    pub fn mfa_state(&self) -> MfaState {
        MfaState::from_str(&self.mfa_state).unwrap_or(MfaState::Disabled)
    }
}

/// Look up a principal by (tenant, identifier) for the first factor.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn lookup_principal(
    pool: &PgPool,
    tenant_id: Uuid,
    identifier: &str,
) -> Result<Option<PrincipalRow>> {
    let query = r"
        SELECT id, tenant_id, identifier, password_hash,
               is_active, is_verified, is_superuser, mfa_state
        FROM principals
        WHERE tenant_id = $1 AND identifier = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, PrincipalRow>(query)
        .bind(tenant_id)
        .bind(identifier)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup principal")
}

/// Fetch a principal by id, tenant-scoped.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn get_principal(
    pool: &PgPool,
    principal_id: Uuid,
    tenant_id: Uuid,
) -> Result<Option<PrincipalRow>> {
    let query = r"
        SELECT id, tenant_id, identifier, password_hash,
               is_active, is_verified, is_superuser, mfa_state
        FROM principals
        WHERE id = $1 AND tenant_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, PrincipalRow>(query)
        .bind(principal_id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch principal")
}

/// Flip the principal's MFA state. Resolved once at first-factor time to
/// pick the one-phase vs two-phase path.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn set_mfa_state(
    pool: &PgPool,
    principal_id: Uuid,
    tenant_id: Uuid,
    state: MfaState,
) -> Result<()> {
    let query = r"
        UPDATE principals
        SET mfa_state = $3
        WHERE id = $1 AND tenant_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(tenant_id)
        .bind(state.as_str())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update MFA state")?;
    Ok(())
}

/// Create a principal. Used by provisioning and the test harness; the
/// caller supplies an already-hashed secret.
///
/// # Errors
/// Returns an error if the insert fails.
pub async fn insert_principal(
    pool: &PgPool,
    tenant_id: Uuid,
    identifier: &str,
    password_hash: &str,
) -> Result<Uuid> {
    let query = r"
        INSERT INTO principals (tenant_id, identifier, password_hash, is_active, is_verified)
        VALUES ($1, $2, $3, TRUE, TRUE)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(tenant_id)
        .bind(identifier)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert principal")?;
    Ok(row.get("id"))
}

/// Soft-disable: principals referenced by sessions and audit records are
/// never physically deleted.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn disable_principal(pool: &PgPool, principal_id: Uuid, tenant_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE principals
        SET is_active = FALSE,
            disabled_at = NOW()
        WHERE id = $1 AND tenant_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(tenant_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to disable principal")?;
    Ok(())
}
