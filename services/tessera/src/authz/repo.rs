use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::graph::RoleGraph;

/// Outcome of an inheritance-edge write.
#[derive(Debug, PartialEq, Eq)]
pub enum InheritanceOutcome {
    Added,
    /// The edge would have closed a cycle and was refused.
    CycleRejected,
}

/// Role ids directly assigned to the principal in this tenant.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn assigned_roles(
    pool: &PgPool,
    principal_id: Uuid,
    tenant_id: Uuid,
) -> Result<Vec<Uuid>> {
    let query = r"
        SELECT role_id
        FROM principal_roles
        WHERE principal_id = $1
          AND tenant_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(principal_id)
        .bind(tenant_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load assigned roles")?;
    Ok(rows.iter().map(|row| row.get("role_id")).collect())
}

/// Load the grant and inheritance graph visible to a tenant (its own
/// roles plus global roles).
///
/// # Errors
/// Returns an error if a query fails.
pub async fn load_role_graph(pool: &PgPool, tenant_id: Uuid) -> Result<RoleGraph> {
    let mut graph = RoleGraph::new();

    let query = r"
        SELECT rp.role_id, rp.permission_code
        FROM role_permissions rp
        JOIN roles r ON r.id = rp.role_id
        WHERE r.tenant_id = $1 OR r.tenant_id IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(tenant_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load role grants")?;
    for row in &rows {
        let role_id: Uuid = row.get("role_id");
        let code: String = row.get("permission_code");
        graph.grant(role_id, code);
    }

    let query = r"
        SELECT ri.role_id, ri.child_role_id
        FROM role_inherits ri
        JOIN roles r ON r.id = ri.role_id
        WHERE r.tenant_id = $1 OR r.tenant_id IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(tenant_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load role inheritance")?;
    for row in &rows {
        let role_id: Uuid = row.get("role_id");
        let child_role_id: Uuid = row.get("child_role_id");
        // The write path enforced acyclicity; resolution is cycle-proof
        // regardless.
        graph.add_edge_unchecked(role_id, child_role_id);
    }

    Ok(graph)
}

/// Write an inheritance edge, rejecting cycles inside the transaction so
/// two concurrent writers cannot sneak a loop past the check.
///
/// # Errors
/// Returns an error if the transaction fails.
pub async fn add_role_inheritance(
    pool: &PgPool,
    role_id: Uuid,
    child_role_id: Uuid,
) -> Result<InheritanceOutcome> {
    let mut tx = pool.begin().await.context("begin inheritance transaction")?;

    // Serialize edge writers; readers are unaffected.
    let query = "LOCK TABLE role_inherits IN SHARE ROW EXCLUSIVE MODE";
    sqlx::query(query)
        .execute(&mut *tx)
        .await
        .context("failed to lock role_inherits")?;

    let query = "SELECT role_id, child_role_id FROM role_inherits";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load edges for cycle check")?;

    let mut graph = RoleGraph::new();
    for row in &rows {
        graph.add_edge_unchecked(row.get("role_id"), row.get("child_role_id"));
    }
    if graph.would_create_cycle(role_id, child_role_id) {
        tx.rollback().await.context("rollback rejected edge")?;
        return Ok(InheritanceOutcome::CycleRejected);
    }

    let query = r"
        INSERT INTO role_inherits (role_id, child_role_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(role_id)
        .bind(child_role_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert inheritance edge")?;

    tx.commit().await.context("commit inheritance edge")?;
    Ok(InheritanceOutcome::Added)
}

/// The principal's superuser flag, tenant-scoped like everything else.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn principal_is_superuser(
    pool: &PgPool,
    principal_id: Uuid,
    tenant_id: Uuid,
) -> Result<bool> {
    let query = r"
        SELECT is_superuser
        FROM principals
        WHERE id = $1 AND tenant_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load superuser flag")?;
    Ok(row.is_some_and(|row| row.get("is_superuser")))
}
