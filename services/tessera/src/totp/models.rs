use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// One TOTP credential row. The seed is never stored in the clear; the
/// ciphertext is AAD-bound to (tenant, principal, credential).
#[derive(Debug, Clone, FromRow)]
pub struct TotpCredential {
    pub credential_id: Uuid,
    pub principal_id: Uuid,
    pub tenant_id: Uuid,
    pub seed_ciphertext: Vec<u8>,
    pub enabled_at: Option<DateTime<Utc>>,
    /// Highest time window already consumed; codes for this window or
    /// older are replays.
    pub last_used_step: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TotpCredential {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled_at.is_some()
    }
}
