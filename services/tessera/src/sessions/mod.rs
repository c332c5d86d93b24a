//! Session lifecycle.
//!
//! Session ids are random v4 UUIDs (nothing to enumerate). The absolute
//! expiry is fixed at creation and is never moved; `last_seen_at` exists
//! for visibility only. Every statement in `repo.rs` is scoped by
//! `(id, principal_id, tenant_id)` — acting on a session you do not own
//! is indistinguishable from acting on one that does not exist.

pub mod models;
pub mod repo;

pub use models::SessionRow;
