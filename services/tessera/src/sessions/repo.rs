use anyhow::{Context, Result};
use chrono::Duration;
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::models::SessionRow;

/// Create a session with a fixed absolute expiry.
///
/// # Errors
/// Returns an error if the insert fails.
pub async fn create_session(
    pool: &PgPool,
    principal_id: Uuid,
    tenant_id: Uuid,
    origin_ip: Option<&str>,
    user_agent: Option<&str>,
    absolute_ttl: Duration,
) -> Result<SessionRow> {
    let query = r"
        INSERT INTO sessions
            (id, principal_id, tenant_id, origin_ip, user_agent, absolute_expires_at)
        VALUES ($1, $2, $3, $4, $5, NOW() + ($6 * INTERVAL '1 second'))
        RETURNING *
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query_as::<_, SessionRow>(query)
        .bind(Uuid::new_v4())
        .bind(principal_id)
        .bind(tenant_id)
        .bind(origin_ip)
        .bind(user_agent)
        .bind(absolute_ttl.num_seconds())
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to create session")
}

/// List the principal's live sessions in this tenant.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn list_sessions(
    pool: &PgPool,
    principal_id: Uuid,
    tenant_id: Uuid,
) -> Result<Vec<SessionRow>> {
    let query = r"
        SELECT * FROM sessions
        WHERE principal_id = $1
          AND tenant_id = $2
          AND revoked_at IS NULL
          AND absolute_expires_at > NOW()
        ORDER BY created_at DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, SessionRow>(query)
        .bind(principal_id)
        .bind(tenant_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list sessions")
}

/// True when the session exists, belongs to `(principal, tenant)`, is not
/// revoked, and is not past its absolute expiry. This is the check every
/// token verification goes through.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn session_is_alive(
    pool: &PgPool,
    session_id: Uuid,
    principal_id: Uuid,
    tenant_id: Uuid,
) -> Result<bool> {
    let query = r"
        SELECT 1 AS one FROM sessions
        WHERE id = $1
          AND principal_id = $2
          AND tenant_id = $3
          AND revoked_at IS NULL
          AND absolute_expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_id)
        .bind(principal_id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check session liveness")?;
    Ok(row.is_some())
}

/// Record activity for visibility without extending the session.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn touch_last_seen(
    pool: &PgPool,
    session_id: Uuid,
    principal_id: Uuid,
    tenant_id: Uuid,
) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET last_seen_at = NOW()
        WHERE id = $1 AND principal_id = $2 AND tenant_id = $3
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .bind(principal_id)
        .bind(tenant_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;
    Ok(())
}

/// Revoke one session. Returns `false` when no live session matched the
/// full `(id, principal, tenant)` scope — the caller reports that exactly
/// like a missing session.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn terminate_session(
    pool: &PgPool,
    session_id: Uuid,
    principal_id: Uuid,
    tenant_id: Uuid,
) -> Result<bool> {
    let query = r"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE id = $1
          AND principal_id = $2
          AND tenant_id = $3
          AND revoked_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(session_id)
        .bind(principal_id)
        .bind(tenant_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to terminate session")?;
    Ok(result.rows_affected() > 0)
}

/// Revoke all of the principal's live sessions in this tenant.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn terminate_all(pool: &PgPool, principal_id: Uuid, tenant_id: Uuid) -> Result<u64> {
    let query = r"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE principal_id = $1
          AND tenant_id = $2
          AND revoked_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(principal_id)
        .bind(tenant_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to terminate all sessions")?;
    Ok(result.rows_affected())
}

/// Purge sessions past absolute expiry plus the retention window. Owned
/// by the maintenance job.
///
/// # Errors
/// Returns an error if the delete fails.
pub async fn prune_expired(pool: &PgPool, retention: Duration) -> Result<u64> {
    let query = r"
        DELETE FROM sessions
        WHERE absolute_expires_at < NOW() - ($1 * INTERVAL '1 second')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(retention.num_seconds())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to prune sessions")?;
    Ok(result.rows_affected())
}
