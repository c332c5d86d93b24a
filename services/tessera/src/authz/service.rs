use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AuthError;

use super::{graph::PermissionSet, repo};

/// The mandatory resolver-boundary tenant check. Mismatches are always
/// fatal to the request and never silently corrected.
///
/// # Errors
/// Returns `TenantMismatch` when the tenants differ.
pub fn require_tenant(principal_tenant_id: Uuid, requested_tenant_id: Uuid) -> Result<(), AuthError> {
    if principal_tenant_id == requested_tenant_id {
        Ok(())
    } else {
        Err(AuthError::TenantMismatch)
    }
}

#[derive(Clone)]
pub struct PermissionResolver {
    pool: PgPool,
}

impl PermissionResolver {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the effective permission set for a principal in a tenant.
    ///
    /// The tenant check happens here, before any role data is touched —
    /// this boundary is mandatory, not a per-call-site courtesy.
    ///
    /// # Errors
    /// Returns `TenantMismatch` when the requested tenant is not the
    /// principal's tenant, `Unavailable` on store failure.
    pub async fn resolve(
        &self,
        principal_id: Uuid,
        principal_tenant_id: Uuid,
        requested_tenant_id: Uuid,
    ) -> Result<PermissionSet, AuthError> {
        require_tenant(principal_tenant_id, requested_tenant_id)?;

        if repo::principal_is_superuser(&self.pool, principal_id, requested_tenant_id)
            .await
            .map_err(AuthError::unavailable)?
        {
            return Ok(PermissionSet::superuser());
        }

        let assigned = repo::assigned_roles(&self.pool, principal_id, requested_tenant_id)
            .await
            .map_err(AuthError::unavailable)?;
        let graph = repo::load_role_graph(&self.pool, requested_tenant_id)
            .await
            .map_err(AuthError::unavailable)?;

        Ok(graph.resolve(&assigned))
    }
}
