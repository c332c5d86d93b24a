//! Tenant-scoped permission resolution.
//!
//! The tenant check lives at the resolver boundary, not at call sites:
//! `PermissionResolver::resolve` refuses a tenant that does not match the
//! authenticated principal's before touching any role data. Role
//! inheritance is a DAG; the write path rejects edges that would close a
//! cycle, and resolution walks with a visited set so even a corrupted
//! store cannot loop it.

pub mod graph;
pub mod repo;
pub mod service;

pub use graph::{PermissionSet, RoleGraph, WILDCARD};
pub use service::PermissionResolver;
