//! TOTP step-up engine: seed lifecycle, encrypted storage, code checks.
//!
//! Seeds are encrypted at rest under a process-wide key (validated at
//! startup) with AAD binding to (tenant, principal, credential). Code
//! verification tolerates ±1 time step for clock drift and enforces a
//! strictly-monotonic window marker so a code can never be accepted twice.

pub mod code;
pub mod crypto;
pub mod models;
pub mod repo;
pub mod service;

pub use crypto::SeedCipher;
pub use service::TotpService;
