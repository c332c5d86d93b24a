//! Signed-token primitives for tessera.
//!
//! Three token kinds share one compact JWT layout signed with HMAC-SHA256:
//! `access` (short-lived, resource-bearing), `refresh` (single-use per
//! rotation), and `step_up` (second-factor gate only). The `kind` claim is
//! the structural discriminator: a verifier asks for exactly one kind, so a
//! step-up token presented where an access token is expected fails before
//! any business logic runs.

mod error;
mod jwt;
mod keyring;

pub use error::Error;
pub use jwt::{TokenClaims, TokenHeader, TokenKind, sign_hs256, verify_hs256};
pub use keyring::Keyring;

pub const TOKEN_VERSION: u8 = 1;
