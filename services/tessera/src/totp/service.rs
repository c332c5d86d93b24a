use anyhow::{Result, anyhow};
use chrono::Utc;
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use super::{code, crypto::SeedCipher, repo::TotpRepo};

/// Everything the caller needs to finish enrollment: shown once, never
/// stored.
#[derive(Debug)]
pub struct EnrollmentStart {
    pub credential_id: Uuid,
    pub secret_base32: String,
    pub otpauth_url: String,
    /// `data:image/png;base64,...` QR payload.
    pub qr_data_url: String,
}

#[derive(Clone)]
pub struct TotpService {
    pool: PgPool,
    cipher: SeedCipher,
    issuer: String,
}

impl TotpService {
    #[must_use]
    pub fn new(pool: PgPool, cipher: SeedCipher, issuer: String) -> Self {
        Self {
            pool,
            cipher,
            issuer,
        }
    }

    /// Begin enrollment: generate a seed, store it encrypted and disabled,
    /// and return the provisioning material for the authenticator app.
    ///
    /// # Errors
    /// Returns an error if seed generation, encryption, or storage fails.
    pub async fn enroll_begin(
        &self,
        principal_id: Uuid,
        tenant_id: Uuid,
        account_label: &str,
    ) -> Result<EnrollmentStart> {
        let secret = Secret::generate_secret();
        let seed = secret
            .to_bytes()
            .map_err(|e| anyhow!("seed generation error: {e}"))?;

        let credential_id = Uuid::new_v4();
        let ciphertext = self
            .cipher
            .encrypt_seed(&seed, tenant_id, principal_id, credential_id)?;

        TotpRepo::create_credential(&self.pool, credential_id, principal_id, tenant_id, &ciphertext)
            .await?;

        let totp = TOTP::new(
            Algorithm::SHA1,
            code::DIGITS,
            1,
            code::STEP_SECONDS.unsigned_abs(),
            seed,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))?;

        let qr = totp
            .get_qr_base64()
            .map_err(|e| anyhow!("QR generation error: {e}"))?;

        Ok(EnrollmentStart {
            credential_id,
            secret_base32: totp.get_secret_base32(),
            otpauth_url: totp.get_url(),
            qr_data_url: format!("data:image/png;base64,{qr}"),
        })
    }

    /// Confirm enrollment by proving possession with a live code. Enables
    /// the credential on success.
    ///
    /// # Errors
    /// Returns an error if the credential is missing, belongs to another
    /// principal or tenant, or storage fails.
    pub async fn enroll_confirm(
        &self,
        principal_id: Uuid,
        tenant_id: Uuid,
        credential_id: Uuid,
        presented_code: &str,
    ) -> Result<bool> {
        let cred = TotpRepo::get_credential(&self.pool, credential_id)
            .await?
            .ok_or_else(|| anyhow!("credential not found"))?;

        if cred.principal_id != principal_id || cred.tenant_id != tenant_id {
            return Err(anyhow!("credential does not belong to principal"));
        }
        if cred.is_enabled() {
            return Ok(true);
        }

        let seed =
            self.cipher
                .decrypt_seed(&cred.seed_ciphertext, tenant_id, principal_id, credential_id)?;

        let now = Utc::now().timestamp();
        let Some(step) = code::check_code(&seed, presented_code, now, cred.last_used_step)? else {
            return Ok(false);
        };

        // Consume the window before enabling so the proving code cannot be
        // replayed as the first login code.
        if !TotpRepo::advance_marker(&self.pool, credential_id, step).await? {
            return Ok(false);
        }
        TotpRepo::enable(&self.pool, principal_id, credential_id).await?;
        Ok(true)
    }

    /// Verify a live code against the enabled credential.
    ///
    /// # Errors
    /// Returns an error if storage or decryption fails.
    pub async fn verify(
        &self,
        principal_id: Uuid,
        tenant_id: Uuid,
        presented_code: &str,
    ) -> Result<bool> {
        let Some(cred) = TotpRepo::get_enabled(&self.pool, principal_id, tenant_id).await? else {
            return Ok(false);
        };

        let seed = self.cipher.decrypt_seed(
            &cred.seed_ciphertext,
            tenant_id,
            principal_id,
            cred.credential_id,
        )?;

        let now = Utc::now().timestamp();
        let Some(step) = code::check_code(&seed, presented_code, now, cred.last_used_step)? else {
            return Ok(false);
        };

        // The conditional update is the linearization point: of two
        // concurrent presentations of the same code, exactly one advances
        // the marker.
        TotpRepo::advance_marker(&self.pool, cred.credential_id, step).await
    }

    /// Drop all TOTP credentials for a principal.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn disable(&self, principal_id: Uuid) -> Result<u64> {
        TotpRepo::delete_for_principal(&self.pool, principal_id).await
    }
}
