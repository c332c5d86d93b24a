//! Recovery-code generation and verification.
//!
//! Each principal gets a fixed batch of ten codes at enrollment, shown in
//! plaintext exactly once. Only Argon2id hashes (peppered server-side)
//! are persisted, and each code verifies successfully at most once.

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

pub const RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_LEN: usize = 12;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
// Crockford-style set: no 0/O or 1/I lookalikes; 32 symbols, so a byte
// modulo the length is unbiased.
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated batch: plaintext for the user, hashes for the
/// store.
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub batch_id: Uuid,
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    /// Generate a full batch under the given pepper.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn generate(pepper: &[u8]) -> Result<Self> {
        let mut rng = OsRng;
        Self::generate_with_rng(&mut rng, pepper)
    }

    fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R, pepper: &[u8]) -> Result<Self> {
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_code(rng)?;
            let hash = hash_recovery_code(&code, pepper)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self {
            batch_id: Uuid::new_v4(),
            codes,
            code_hashes,
        })
    }
}

/// Normalize user input: strip separators, uppercase, validate alphabet.
///
/// # Errors
/// Returns an error for codes of the wrong length or character set.
pub fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }
    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow::anyhow!("invalid recovery code characters"));
    }
    Ok(normalized)
}

/// Group a normalized code as `XXXX-XXXX-XXXX` for display.
///
/// # Errors
/// Returns an error for codes of the wrong length.
pub fn format_recovery_code(normalized: &str) -> Result<String> {
    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 2);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}

/// Verify a presented code against one stored hash.
///
/// # Errors
/// Returns an error when the input fails normalization or the stored
/// hash is malformed — callers fold both into "invalid code".
pub fn verify_recovery_code(code: &str, stored_hash: &str, pepper: &[u8]) -> Result<bool> {
    let normalized = normalize_recovery_code(code)?;
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|_| anyhow::anyhow!("invalid recovery code hash"))?;
    let argon2 = peppered_argon2(pepper)?;
    Ok(argon2
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    rng.fill_bytes(&mut raw);
    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % RECOVERY_CODE_ALPHABET.len();
        if let Some(&char_byte) = RECOVERY_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_recovery_code(&normalized)
}

fn hash_recovery_code(code: &str, pepper: &[u8]) -> Result<String> {
    let normalized = normalize_recovery_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = peppered_argon2(pepper)?;
    let hash = argon2
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash recovery code"))?
        .to_string();
    Ok(hash)
}

fn peppered_argon2(pepper: &[u8]) -> Result<Argon2<'_>> {
    Argon2::new_with_secret(
        pepper,
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::default(),
    )
    .map_err(|_| anyhow::anyhow!("failed to initialize Argon2id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEPPER: &[u8] = b"test-pepper-material";

    #[test]
    fn normalize_strips_separators_and_uppercases() -> Result<()> {
        let normalized = normalize_recovery_code("abcd-efgh-jklm")?;
        assert_eq!(normalized, "ABCDEFGHJKLM");
        Ok(())
    }

    #[test]
    fn normalize_rejects_wrong_shapes() {
        assert!(normalize_recovery_code("short").is_err());
        // 0, 1, I, O are not in the alphabet.
        assert!(normalize_recovery_code("ABCD-EFGH-JK10").is_err());
    }

    #[test]
    fn format_groups_in_fours() -> Result<()> {
        assert_eq!(format_recovery_code("ABCDEFGHJKLM")?, "ABCD-EFGH-JKLM");
        Ok(())
    }

    #[test]
    fn batch_has_ten_matching_pairs() -> Result<()> {
        let batch = RecoveryCodeBatch::generate(PEPPER)?;
        assert_eq!(batch.codes.len(), RECOVERY_CODE_COUNT);
        assert_eq!(batch.code_hashes.len(), RECOVERY_CODE_COUNT);

        let code = batch.codes.first().context("missing code")?;
        let hash = batch.code_hashes.first().context("missing hash")?;
        assert!(verify_recovery_code(code, hash, PEPPER)?);
        assert!(!verify_recovery_code("ABCD-EFGH-9999", hash, PEPPER)?);
        Ok(())
    }

    #[test]
    fn pepper_is_load_bearing() -> Result<()> {
        let batch = RecoveryCodeBatch::generate(PEPPER)?;
        let code = batch.codes.first().context("missing code")?;
        let hash = batch.code_hashes.first().context("missing hash")?;
        assert!(!verify_recovery_code(code, hash, b"some-other-pepper")?);
        Ok(())
    }

    #[test]
    fn single_use_is_enforced_by_the_consumer() -> Result<()> {
        // The store consumes hashes with a conditional update; model that
        // contract here with an in-memory used flag.
        let batch = RecoveryCodeBatch::generate(PEPPER)?;
        let code = batch.codes.first().context("missing code")?;
        let hash = batch.code_hashes.first().context("missing hash")?;
        let mut used = false;

        let mut consume = |input: &str| {
            if used {
                return false;
            }
            if verify_recovery_code(input, hash, PEPPER).unwrap_or(false) {
                used = true;
                true
            } else {
                false
            }
        };

        assert!(consume(code));
        assert!(!consume(code));
        Ok(())
    }
}
