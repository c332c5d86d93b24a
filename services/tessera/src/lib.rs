//! # Tessera (Authentication, Session & Step-Up Trust Core)
//!
//! `tessera` is the authentication core of a multi-tenant platform:
//! credential verification, signed-token issuance and rotation, session
//! lifecycle, TOTP step-up, brute-force defense, and tenant-scoped
//! permission resolution.
//!
//! ## Tenant model
//!
//! Tenants are the isolation boundary. Every principal-scoped row carries
//! a tenant id and every lookup includes it; the permission resolver
//! additionally refuses mismatched tenants at its own boundary, so a
//! call site cannot forget the check.
//!
//! ## Token model
//!
//! Three HMAC-signed token kinds share one layout and are told apart by a
//! `kind` claim: short-lived access tokens (self-verifying, deny-listable,
//! dead with their session), single-use refresh tokens (rotation is a
//! conditional update; reuse revokes the family), and step-up tokens
//! (second-factor gate only, never a capability).
//!
//! ## Failure discipline
//!
//! Credential, MFA, and ownership failures collapse to generic codes
//! before the wire. Store failures are a separate retryable class. A
//! session not owned by the caller answers exactly like one that does not
//! exist.

pub mod api;
pub mod audit;
pub mod authz;
pub mod cli;
pub mod error;
pub mod guard;
pub mod password;
pub mod sessions;
pub mod tokens;
pub mod totp;
