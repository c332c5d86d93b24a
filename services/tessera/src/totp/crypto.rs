//! Seed encryption at rest.
//!
//! ChaCha20-Poly1305 with the layout `nonce (12 bytes) || ciphertext`.
//! The AAD binds a ciphertext to its (tenant, principal, credential), so a
//! row copied between principals or tenants fails authentication on
//! decrypt. The key is process-wide configuration; construction rejects
//! placeholder material so a misconfigured deployment fails at startup,
//! not at first decrypt.

use anyhow::{Result, anyhow};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

pub const SEED_KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

#[derive(Clone)]
pub struct SeedCipher {
    cipher: ChaCha20Poly1305,
}

impl SeedCipher {
    /// Build a cipher from 32 bytes of key material.
    ///
    /// # Errors
    /// Returns an error if the key is the wrong length, all zeros, or a
    /// repeated single byte (the classic placeholder patterns).
    pub fn new(key_bytes: &[u8]) -> Result<Self> {
        if key_bytes.len() != SEED_KEY_BYTES {
            return Err(anyhow!(
                "seed key must be exactly {SEED_KEY_BYTES} bytes, got {}",
                key_bytes.len()
            ));
        }
        let first = key_bytes.first().copied().unwrap_or_default();
        if key_bytes.iter().all(|byte| *byte == first) {
            return Err(anyhow!("seed key is a placeholder (repeated byte pattern)"));
        }
        let key = Key::from_slice(key_bytes);
        Ok(Self {
            cipher: ChaCha20Poly1305::new(key),
        })
    }

    /// Decode a base64 key (the form it takes in configuration).
    ///
    /// # Errors
    /// Returns an error if decoding fails or the key fails validation.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        use base64ct::{Base64, Base64Unpadded, Encoding};
        let trimmed = encoded.trim();
        let bytes = Base64::decode_vec(trimmed)
            .or_else(|_| Base64Unpadded::decode_vec(trimmed))
            .map_err(|_| anyhow!("seed key is not valid base64"))?;
        Self::new(&bytes)
    }

    /// Encrypt a seed. Returns `nonce || ciphertext`.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn encrypt_seed(
        &self,
        seed: &[u8],
        tenant_id: Uuid,
        principal_id: Uuid,
        credential_id: Uuid,
    ) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = construct_aad(tenant_id, principal_id, credential_id);
        let payload = Payload {
            msg: seed,
            aad: &aad,
        };

        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|e| anyhow!("seed encryption failure: {e}"))?;

        let mut result = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt `nonce || ciphertext` back into the seed.
    ///
    /// # Errors
    /// Returns an error if the input is too short, the AAD does not match,
    /// or authentication fails.
    pub fn decrypt_seed(
        &self,
        data: &[u8],
        tenant_id: Uuid,
        principal_id: Uuid,
        credential_id: Uuid,
    ) -> Result<Vec<u8>> {
        if data.len() < NONCE_BYTES {
            return Err(anyhow!("invalid seed ciphertext length"));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_BYTES);
        let nonce = Nonce::from_slice(nonce_bytes);

        let aad = construct_aad(tenant_id, principal_id, credential_id);
        let payload = Payload {
            msg: ciphertext,
            aad: &aad,
        };

        self.cipher
            .decrypt(nonce, payload)
            .map_err(|e| anyhow!("seed decryption failure: {e}"))
    }
}

impl std::fmt::Debug for SeedCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedCipher").finish_non_exhaustive()
    }
}

fn construct_aad(tenant_id: Uuid, principal_id: Uuid, credential_id: Uuid) -> Vec<u8> {
    format!("mfa-seed:v1|{tenant_id}|{principal_id}|{credential_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> SeedCipher {
        let key: Vec<u8> = (0..32u8).collect();
        match SeedCipher::new(&key) {
            Ok(cipher) => cipher,
            Err(err) => panic!("cipher: {err}"),
        }
    }

    #[test]
    fn rejects_placeholder_keys() {
        assert!(SeedCipher::new(&[0u8; 32]).is_err());
        assert!(SeedCipher::new(&[42u8; 32]).is_err());
        assert!(SeedCipher::new(&[1, 2, 3]).is_err());
    }

    #[test]
    fn encrypt_decrypt_round_trip() -> Result<()> {
        let cipher = test_cipher();
        let seed = b"my-secret-seed-123";
        let tenant = Uuid::new_v4();
        let principal = Uuid::new_v4();
        let credential = Uuid::new_v4();

        let encrypted = cipher.encrypt_seed(seed, tenant, principal, credential)?;
        assert_ne!(encrypted.as_slice(), seed.as_slice());
        assert!(encrypted.len() > seed.len());

        let decrypted = cipher.decrypt_seed(&encrypted, tenant, principal, credential)?;
        assert_eq!(decrypted, seed);
        Ok(())
    }

    #[test]
    fn decrypt_fails_for_wrong_binding() -> Result<()> {
        let cipher = test_cipher();
        let seed = b"secret";
        let tenant = Uuid::new_v4();
        let principal = Uuid::new_v4();
        let credential = Uuid::new_v4();

        let encrypted = cipher.encrypt_seed(seed, tenant, principal, credential)?;

        // A row replayed under another principal or tenant must not decrypt.
        assert!(
            cipher
                .decrypt_seed(&encrypted, tenant, Uuid::new_v4(), credential)
                .is_err()
        );
        assert!(
            cipher
                .decrypt_seed(&encrypted, Uuid::new_v4(), principal, credential)
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn decrypt_fails_for_tampered_ciphertext() -> Result<()> {
        let cipher = test_cipher();
        let tenant = Uuid::new_v4();
        let principal = Uuid::new_v4();
        let credential = Uuid::new_v4();

        let mut encrypted = cipher.encrypt_seed(b"secret", tenant, principal, credential)?;
        if let Some(byte) = encrypted.last_mut() {
            *byte ^= 0xFF;
        }

        assert!(
            cipher
                .decrypt_seed(&encrypted, tenant, principal, credential)
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn base64_key_loading() {
        use base64ct::{Base64, Encoding};
        let key: Vec<u8> = (100..132u8).collect();
        let encoded = Base64::encode_string(&key);
        assert!(SeedCipher::from_base64(&encoded).is_ok());
        assert!(SeedCipher::from_base64("!!not-base64!!").is_err());
    }
}
