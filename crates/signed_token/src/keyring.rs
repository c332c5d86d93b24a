//! Signing-key registry with kid-based rotation.
//!
//! Signing always uses the active kid. Verification accepts any kid still
//! present in the ring, so a retired secret keeps validating the tokens it
//! signed until they expire naturally; deleting the kid cuts them off
//! immediately. The grace window during a rotation is therefore whatever
//! the operator configures, not an accident of deployment order.

use std::collections::HashMap;

use crate::Error;

const MIN_SECRET_BYTES: usize = 32;

/// Values that must never ship as signing secrets.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "changeme",
    "change-me",
    "default",
    "insecure",
    "password",
    "secret",
    "tessera",
];

#[derive(Clone)]
pub struct Keyring {
    active_kid: String,
    keys: HashMap<String, Vec<u8>>,
}

impl Keyring {
    /// Build a keyring with a single active key.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than 32 bytes or is a
    /// known placeholder value.
    pub fn new(active_kid: impl Into<String>, secret: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let active_kid = active_kid.into();
        let secret = secret.into();
        validate_secret(&active_kid, &secret)?;
        let mut keys = HashMap::new();
        keys.insert(active_kid.clone(), secret);
        Ok(Self { active_kid, keys })
    }

    /// Add a verification-capable key (for example a retired secret kept
    /// alive through a rotation window).
    ///
    /// # Errors
    /// Returns an error if the secret fails validation.
    pub fn insert(&mut self, kid: impl Into<String>, secret: impl Into<Vec<u8>>) -> Result<(), Error> {
        let kid = kid.into();
        let secret = secret.into();
        validate_secret(&kid, &secret)?;
        self.keys.insert(kid, secret);
        Ok(())
    }

    /// Promote an already-present kid to be the signing key.
    ///
    /// # Errors
    /// Returns an error if the kid is not in the ring.
    pub fn set_active(&mut self, kid: impl Into<String>) -> Result<(), Error> {
        let kid = kid.into();
        if !self.keys.contains_key(&kid) {
            return Err(Error::ActiveKidMissing(kid));
        }
        self.active_kid = kid;
        Ok(())
    }

    /// Drop a kid from the ring. Tokens signed under it stop verifying.
    /// The active kid cannot be removed.
    pub fn remove(&mut self, kid: &str) -> bool {
        if kid == self.active_kid {
            return false;
        }
        self.keys.remove(kid).is_some()
    }

    #[must_use]
    pub fn active_kid(&self) -> &str {
        &self.active_kid
    }

    #[must_use]
    pub(crate) fn secret(&self, kid: &str) -> Option<&[u8]> {
        self.keys.get(kid).map(Vec::as_slice)
    }

    pub(crate) fn active_secret(&self) -> Result<&[u8], Error> {
        self.secret(&self.active_kid)
            .ok_or_else(|| Error::ActiveKidMissing(self.active_kid.clone()))
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        f.debug_struct("Keyring")
            .field("active_kid", &self.active_kid)
            .field("kids", &kids)
            .finish()
    }
}

fn validate_secret(kid: &str, secret: &[u8]) -> Result<(), Error> {
    if secret.len() < MIN_SECRET_BYTES {
        return Err(Error::SecretTooShort(kid.to_string()));
    }
    if let Ok(text) = std::str::from_utf8(secret) {
        let lowered = text.trim().to_ascii_lowercase();
        // Catch padded placeholders like "changeme00000000..." too.
        if PLACEHOLDER_SECRETS
            .iter()
            .any(|known| lowered == *known || lowered.trim_end_matches('0') == *known)
        {
            return Err(Error::PlaceholderSecret(kid.to_string()));
        }
    }
    if secret.iter().all(|byte| *byte == 0) {
        return Err(Error::PlaceholderSecret(kid.to_string()));
    }
    Ok(())
}
