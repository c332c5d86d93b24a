//! Storage helpers for recovery codes.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Replace the principal's recovery codes with a fresh batch. One
/// transaction: old codes die with the new batch's birth.
///
/// # Errors
/// Returns an error if the transaction fails.
pub async fn replace_recovery_codes(
    pool: &PgPool,
    principal_id: Uuid,
    batch_id: Uuid,
    code_hashes: &[String],
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin recovery-code transaction")?;

    let query = "DELETE FROM mfa_recovery_codes WHERE principal_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete old recovery codes")?;

    let query = r"
        INSERT INTO mfa_recovery_codes (principal_id, batch_id, code_hash)
        VALUES ($1, $2, $3)
    ";
    for hash in code_hashes {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(principal_id)
            .bind(batch_id)
            .bind(hash)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert recovery code")?;
    }

    tx.commit().await.context("commit recovery-code transaction")?;
    Ok(())
}

/// Unused code hashes for the principal.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn list_unused_hashes(pool: &PgPool, principal_id: Uuid) -> Result<Vec<String>> {
    let query = r"
        SELECT code_hash
        FROM mfa_recovery_codes
        WHERE principal_id = $1
          AND used_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(principal_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list recovery codes")?;
    Ok(rows
        .into_iter()
        .map(|row| row.get::<String, _>("code_hash"))
        .collect())
}

/// Mark one code used. The conditional update is the single-use
/// guarantee: of two concurrent presentations, one gets `false`.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn consume_recovery_code(
    pool: &PgPool,
    principal_id: Uuid,
    code_hash: &str,
) -> Result<bool> {
    let query = r"
        UPDATE mfa_recovery_codes
        SET used_at = NOW()
        WHERE principal_id = $1
          AND code_hash = $2
          AND used_at IS NULL
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .bind(code_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume recovery code")?;
    Ok(row.is_some())
}

/// How many unused codes remain (for the recovery-use alert).
///
/// # Errors
/// Returns an error if the query fails.
pub async fn count_unused(pool: &PgPool, principal_id: Uuid) -> Result<u64> {
    let query = r"
        SELECT COUNT(*) AS remaining
        FROM mfa_recovery_codes
        WHERE principal_id = $1
          AND used_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count recovery codes")?;
    let remaining: i64 = row.get("remaining");
    Ok(u64::try_from(remaining).unwrap_or(0))
}

/// Remove every code for the principal (MFA disable).
///
/// # Errors
/// Returns an error if the delete fails.
pub async fn delete_for_principal(pool: &PgPool, principal_id: Uuid) -> Result<u64> {
    let query = "DELETE FROM mfa_recovery_codes WHERE principal_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(principal_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete recovery codes")?;
    Ok(result.rows_affected())
}
