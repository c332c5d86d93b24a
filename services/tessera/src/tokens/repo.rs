use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRow {
    pub jti: Uuid,
    pub session_id: Uuid,
    pub principal_id: Uuid,
    pub tenant_id: Uuid,
    pub token_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Store a new refresh token's hash. The raw token goes only to the
/// caller; the database never sees it.
///
/// # Errors
/// Returns an error if the insert fails.
pub async fn insert_refresh_token(
    pool: &PgPool,
    jti: Uuid,
    session_id: Uuid,
    principal_id: Uuid,
    tenant_id: Uuid,
    token_hash: &[u8],
    ttl: Duration,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens
            (jti, session_id, principal_id, tenant_id, token_hash, expires_at)
        VALUES ($1, $2, $3, $4, $5, NOW() + ($6 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(jti)
        .bind(session_id)
        .bind(principal_id)
        .bind(tenant_id)
        .bind(token_hash)
        .bind(ttl.num_seconds())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}

/// Fetch a refresh token row by jti.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn get_refresh_token(pool: &PgPool, jti: Uuid) -> Result<Option<RefreshTokenRow>> {
    let query = "SELECT * FROM refresh_tokens WHERE jti = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, RefreshTokenRow>(query)
        .bind(jti)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch refresh token")
}

/// Flip `used_at` exactly once. Returns `false` when another rotation got
/// there first — the caller treats that exactly like a replay.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn consume_refresh_token(pool: &PgPool, jti: Uuid) -> Result<bool> {
    let query = r"
        UPDATE refresh_tokens
        SET used_at = NOW()
        WHERE jti = $1
          AND used_at IS NULL
        RETURNING jti
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(jti)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume refresh token")?;
    Ok(row.is_some())
}

/// Append a jti to the access-token deny-list, covering its remaining
/// natural lifetime.
///
/// # Errors
/// Returns an error if the insert fails.
pub async fn revoke_jti(pool: &PgPool, jti: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
    let query = r"
        INSERT INTO revoked_tokens (jti, expires_at)
        VALUES ($1, $2)
        ON CONFLICT (jti) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(jti)
        .bind(expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke token")?;
    Ok(())
}

/// Deny-list membership check for access-token verification.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn jti_is_revoked(pool: &PgPool, jti: Uuid) -> Result<bool> {
    let query = "SELECT 1 AS one FROM revoked_tokens WHERE jti = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(jti)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check token revocation")?;
    Ok(row.is_some())
}

/// Revoke every live session owned by the principal. The replay response:
/// access tokens die with their sessions, refresh tokens die with both.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn revoke_principal_sessions(pool: &PgPool, principal_id: Uuid) -> Result<u64> {
    let query = r"
        UPDATE sessions
        SET revoked_at = NOW()
        WHERE principal_id = $1
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
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke principal sessions")?;
    Ok(result.rows_affected())
}

/// Drop deny-list entries for tokens that have expired naturally. Owned
/// by the maintenance job.
///
/// # Errors
/// Returns an error if the delete fails.
pub async fn prune_revoked(pool: &PgPool) -> Result<u64> {
    let query = "DELETE FROM revoked_tokens WHERE expires_at < NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to prune revoked tokens")?;
    Ok(result.rows_affected())
}
