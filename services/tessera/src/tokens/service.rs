use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use signed_token::{Keyring, TOKEN_VERSION, TokenClaims, TokenKind, sign_hs256, verify_hs256};
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    audit::{AuditEvent, AuditSink},
    error::AuthError,
    sessions,
    tokens::repo,
};

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub step_up_ttl: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            access_ttl: Duration::minutes(10),
            refresh_ttl: Duration::days(14),
            step_up_ttl: Duration::minutes(5),
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_step_up_ttl(mut self, ttl: Duration) -> Self {
        self.step_up_ttl = ttl;
        self
    }
}

/// A freshly minted access+refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub session_id: Uuid,
}

/// Verified access-token context; the identity every authorized request
/// runs under.
#[derive(Debug, Clone, Copy)]
pub struct AccessContext {
    pub principal_id: Uuid,
    pub tenant_id: Uuid,
    pub session_id: Uuid,
    pub jti: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Verified step-up token context: enough to finish the second factor,
/// useless for anything else.
#[derive(Debug, Clone, Copy)]
pub struct StepUpContext {
    pub principal_id: Uuid,
    pub tenant_id: Uuid,
}

#[derive(Clone)]
pub struct TokenAuthority {
    pool: PgPool,
    keyring: Arc<Keyring>,
    config: TokenConfig,
    audit: Arc<dyn AuditSink>,
}

impl TokenAuthority {
    #[must_use]
    pub fn new(
        pool: PgPool,
        keyring: Arc<Keyring>,
        config: TokenConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            pool,
            keyring,
            config,
            audit,
        }
    }

    fn claims(
        &self,
        kind: TokenKind,
        principal_id: Uuid,
        tenant_id: Uuid,
        session_id: Option<Uuid>,
        jti: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> TokenClaims {
        TokenClaims {
            v: TOKEN_VERSION,
            iss: self.config.issuer.clone(),
            kind,
            sub: principal_id.to_string(),
            tid: tenant_id.to_string(),
            sid: session_id.map(|id| id.to_string()),
            jti: jti.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// Mint an access+refresh pair bound to a session and persist the
    /// refresh token's hash.
    ///
    /// # Errors
    /// Returns an error if signing or storage fails.
    pub async fn issue_pair(
        &self,
        principal_id: Uuid,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();

        let access_claims = self.claims(
            TokenKind::Access,
            principal_id,
            tenant_id,
            Some(session_id),
            Uuid::new_v4(),
            now,
            self.config.access_ttl,
        );
        let access_token = sign_hs256(&self.keyring, &access_claims)?;

        let refresh_jti = Uuid::new_v4();
        let refresh_claims = self.claims(
            TokenKind::Refresh,
            principal_id,
            tenant_id,
            Some(session_id),
            refresh_jti,
            now,
            self.config.refresh_ttl,
        );
        let refresh_token = sign_hs256(&self.keyring, &refresh_claims)?;

        repo::insert_refresh_token(
            &self.pool,
            refresh_jti,
            session_id,
            principal_id,
            tenant_id,
            &token_hash(&refresh_token),
            self.config.refresh_ttl,
        )
        .await
        .map_err(AuthError::unavailable)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at: now + self.config.access_ttl,
            refresh_expires_at: now + self.config.refresh_ttl,
            session_id,
        })
    }

    /// Mint the intermediate step-up token after a successful first
    /// factor. Not bound to a session; not a capability token.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_step_up(
        &self,
        principal_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let now = Utc::now();
        let claims = self.claims(
            TokenKind::StepUp,
            principal_id,
            tenant_id,
            None,
            Uuid::new_v4(),
            now,
            self.config.step_up_ttl,
        );
        let token = sign_hs256(&self.keyring, &claims)?;
        Ok((token, now + self.config.step_up_ttl))
    }

    /// Full access-token verification: signature, expiry, deny-list, and
    /// the liveness of the bound session.
    ///
    /// # Errors
    /// Returns `MfaRequired` for a step-up token presented as an access
    /// token, `TokenExpired`/`TokenInvalid` for the other failure modes.
    pub async fn verify_access(&self, token: &str) -> Result<AccessContext, AuthError> {
        let now = Utc::now().timestamp();
        let claims = match verify_hs256(
            token,
            &self.keyring,
            &self.config.issuer,
            TokenKind::Access,
            now,
        ) {
            Ok(claims) => claims,
            Err(signed_token::Error::WrongKind) => {
                // A step-up token is structurally unusable here, but the
                // caller gets a more useful signal than "invalid".
                if verify_hs256(
                    token,
                    &self.keyring,
                    &self.config.issuer,
                    TokenKind::StepUp,
                    now,
                )
                .is_ok()
                {
                    return Err(AuthError::MfaRequired);
                }
                return Err(AuthError::TokenInvalid);
            }
            Err(err) => return Err(err.into()),
        };

        let ctx = access_context(&claims)?;

        if repo::jti_is_revoked(&self.pool, ctx.jti)
            .await
            .map_err(AuthError::unavailable)?
        {
            return Err(AuthError::TokenInvalid);
        }

        let alive = sessions::repo::session_is_alive(
            &self.pool,
            ctx.session_id,
            ctx.principal_id,
            ctx.tenant_id,
        )
        .await
        .map_err(AuthError::unavailable)?;
        if !alive {
            return Err(AuthError::TokenInvalid);
        }

        Ok(ctx)
    }

    /// Verify a step-up token. Stateless: the token is not bound to a
    /// session yet.
    ///
    /// # Errors
    /// Returns `TokenExpired`/`TokenInvalid` on failure.
    pub fn verify_step_up(&self, token: &str) -> Result<StepUpContext, AuthError> {
        let claims = verify_hs256(
            token,
            &self.keyring,
            &self.config.issuer,
            TokenKind::StepUp,
            Utc::now().timestamp(),
        )?;
        let principal_id = parse_uuid(&claims.sub)?;
        let tenant_id = parse_uuid(&claims.tid)?;
        Ok(StepUpContext {
            principal_id,
            tenant_id,
        })
    }

    /// Rotate a refresh token: exactly one rotation per token, enforced by
    /// the conditional update on `used_at`. A second presentation revokes
    /// the principal's entire token family and fails.
    ///
    /// # Errors
    /// Returns `TokenReplayDetected` on reuse, `TokenExpired`/`TokenInvalid`
    /// otherwise.
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let claims = verify_hs256(
            presented,
            &self.keyring,
            &self.config.issuer,
            TokenKind::Refresh,
            Utc::now().timestamp(),
        )?;
        let jti = parse_uuid(&claims.jti)?;

        let row = repo::get_refresh_token(&self.pool, jti)
            .await
            .map_err(AuthError::unavailable)?
            .ok_or(AuthError::TokenInvalid)?;

        // The signature already proves authenticity; the stored hash ties
        // this jti to exactly one token string.
        let presented_hash = token_hash(presented);
        if !bool::from(presented_hash.ct_eq(row.token_hash.as_slice())) {
            return Err(AuthError::TokenInvalid);
        }
        if row.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        if row.used_at.is_some() {
            return Err(self.handle_replay(&row).await);
        }

        // CAS: of two concurrent rotations of a still-unused token, one
        // flips used_at and the other lands here.
        let consumed = repo::consume_refresh_token(&self.pool, jti)
            .await
            .map_err(AuthError::unavailable)?;
        if !consumed {
            return Err(self.handle_replay(&row).await);
        }

        let alive = sessions::repo::session_is_alive(
            &self.pool,
            row.session_id,
            row.principal_id,
            row.tenant_id,
        )
        .await
        .map_err(AuthError::unavailable)?;
        if !alive {
            return Err(AuthError::TokenInvalid);
        }

        self.issue_pair(row.principal_id, row.tenant_id, row.session_id)
            .await
    }

    async fn handle_replay(&self, row: &repo::RefreshTokenRow) -> AuthError {
        let sessions_revoked = match repo::revoke_principal_sessions(&self.pool, row.principal_id)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                // The replay verdict stands; the caller still gets a hard
                // failure even if mass revocation needs a retry.
                tracing::error!("replay response failed to revoke sessions: {err:#}");
                0
            }
        };
        if let Err(err) = repo::revoke_jti(&self.pool, row.jti, row.expires_at).await {
            tracing::error!("replay response failed to deny-list jti: {err:#}");
        }
        self.audit.emit(&AuditEvent::TokenReplayDetected {
            tenant_id: row.tenant_id,
            principal_id: row.principal_id,
            jti: row.jti,
            sessions_revoked,
        });
        AuthError::TokenReplayDetected
    }

    /// Logout: deny-list the presented access token for its remaining
    /// lifetime and revoke the bound session (or every session).
    ///
    /// # Errors
    /// Returns an error if storage fails.
    pub async fn logout(&self, ctx: &AccessContext, all_sessions: bool) -> Result<u64, AuthError> {
        repo::revoke_jti(&self.pool, ctx.jti, ctx.expires_at)
            .await
            .map_err(AuthError::unavailable)?;

        let revoked = if all_sessions {
            let count = sessions::repo::terminate_all(&self.pool, ctx.principal_id, ctx.tenant_id)
                .await
                .map_err(AuthError::unavailable)?;
            self.audit.emit(&AuditEvent::AllSessionsTerminated {
                tenant_id: ctx.tenant_id,
                principal_id: ctx.principal_id,
                sessions_revoked: count,
            });
            count
        } else {
            let terminated = sessions::repo::terminate_session(
                &self.pool,
                ctx.session_id,
                ctx.principal_id,
                ctx.tenant_id,
            )
            .await
            .map_err(AuthError::unavailable)?;
            u64::from(terminated)
        };
        Ok(revoked)
    }
}

fn access_context(claims: &TokenClaims) -> Result<AccessContext, AuthError> {
    let principal_id = parse_uuid(&claims.sub)?;
    let tenant_id = parse_uuid(&claims.tid)?;
    let session_id = claims
        .sid
        .as_deref()
        .ok_or(AuthError::TokenInvalid)
        .and_then(parse_uuid)?;
    let jti = parse_uuid(&claims.jti)?;
    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(AuthError::TokenInvalid)?;
    Ok(AccessContext {
        principal_id,
        tenant_id,
        session_id,
        jti,
        expires_at,
    })
}

fn parse_uuid(value: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(value).map_err(|_| AuthError::TokenInvalid)
}

fn token_hash(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
