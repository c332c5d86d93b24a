use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::models::TotpCredential;

pub struct TotpRepo;

impl TotpRepo {
    /// Insert a freshly generated, not-yet-confirmed credential.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn create_credential(
        pool: &PgPool,
        credential_id: Uuid,
        principal_id: Uuid,
        tenant_id: Uuid,
        seed_ciphertext: &[u8],
    ) -> Result<()> {
        let query = r"
            INSERT INTO mfa_totp_secrets
                (credential_id, principal_id, tenant_id, seed_ciphertext)
            VALUES ($1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(credential_id)
            .bind(principal_id)
            .bind(tenant_id)
            .bind(seed_ciphertext)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to insert TOTP credential")?;
        Ok(())
    }

    /// Fetch a credential by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_credential(
        pool: &PgPool,
        credential_id: Uuid,
    ) -> Result<Option<TotpCredential>> {
        let query = "SELECT * FROM mfa_totp_secrets WHERE credential_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, TotpCredential>(query)
            .bind(credential_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch TOTP credential")
    }

    /// Fetch the enabled credential for a principal, tenant-scoped.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_enabled(
        pool: &PgPool,
        principal_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<TotpCredential>> {
        let query = r"
            SELECT * FROM mfa_totp_secrets
            WHERE principal_id = $1
              AND tenant_id = $2
              AND enabled_at IS NOT NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, TotpCredential>(query)
            .bind(principal_id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch enabled TOTP credential")
    }

    /// Enable a confirmed credential and drop any leftover enrollment
    /// attempts, in one transaction.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn enable(pool: &PgPool, principal_id: Uuid, credential_id: Uuid) -> Result<()> {
        let mut tx = pool.begin().await.context("begin enable transaction")?;

        let query = r"
            DELETE FROM mfa_totp_secrets
            WHERE principal_id = $1 AND credential_id <> $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(principal_id)
            .bind(credential_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to drop stale TOTP credentials")?;

        let query = r"
            UPDATE mfa_totp_secrets
            SET enabled_at = NOW()
            WHERE credential_id = $1 AND enabled_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(credential_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to enable TOTP credential")?;

        tx.commit().await.context("commit enable transaction")?;
        Ok(())
    }

    /// Advance the anti-replay marker, but only forward. Returns `false`
    /// when a concurrent verification already consumed this window.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn advance_marker(pool: &PgPool, credential_id: Uuid, step: i64) -> Result<bool> {
        let query = r"
            UPDATE mfa_totp_secrets
            SET last_used_step = $2,
                last_used_at = NOW()
            WHERE credential_id = $1
              AND last_used_step < $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(credential_id)
            .bind(step)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to advance TOTP marker")?;
        Ok(result.rows_affected() == 1)
    }

    /// Remove all credentials for a principal (MFA disable).
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn delete_for_principal(pool: &PgPool, principal_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM mfa_totp_secrets WHERE principal_id = $1";
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
            .context("failed to delete TOTP credentials")?;
        Ok(result.rows_affected())
    }
}
