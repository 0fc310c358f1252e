//! Refresh session records and the store seam.
//!
//! Raw refresh tokens never reach storage. Records hold a SHA-256 digest of the
//! token and are compared in constant time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// One issued refresh token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: Vec<u8>,
    pub token_family: Uuid,
    pub version: u32,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshSession {
    /// Not revoked and not yet expired.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }

    #[must_use]
    pub fn matches(&self, raw_token: &str) -> bool {
        token_hash_matches(&self.token_hash, raw_token)
    }
}

/// A refresh session about to be recorded.
#[derive(Clone, Debug)]
pub struct NewRefreshSession {
    pub user_id: Uuid,
    pub token_hash: Vec<u8>,
    pub token_family: Uuid,
    pub version: u32,
    pub expires_at: DateTime<Utc>,
}

impl NewRefreshSession {
    /// # Errors
    /// Returns an error if `now + ttl` is not a representable timestamp.
    pub fn new(
        user_id: Uuid,
        token_family: Uuid,
        version: u32,
        raw_token: &str,
        ttl: Duration,
    ) -> Result<Self> {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .context("refresh session expiry out of range")?;
        Ok(Self {
            user_id,
            token_hash: hash_refresh_token(raw_token),
            token_family,
            version,
            expires_at,
        })
    }

    #[must_use]
    pub fn into_session(self, now: DateTime<Utc>) -> RefreshSession {
        RefreshSession {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            token_hash: self.token_hash,
            token_family: self.token_family,
            version: self.version,
            is_revoked: false,
            created_at: now,
            expires_at: self.expires_at,
        }
    }
}

#[must_use]
pub fn hash_refresh_token(raw_token: &str) -> Vec<u8> {
    Sha256::digest(raw_token.as_bytes()).to_vec()
}

#[must_use]
pub fn token_hash_matches(stored: &[u8], raw_token: &str) -> bool {
    let presented = hash_refresh_token(raw_token);
    stored.ct_eq(&presented).into()
}

/// Persistence of refresh sessions.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, session: NewRefreshSession) -> Result<RefreshSession>;

    /// Hash `raw_token` and record it as a new, unrevoked session.
    async fn record(
        &self,
        user_id: Uuid,
        token_family: Uuid,
        version: u32,
        raw_token: &str,
        ttl: Duration,
    ) -> Result<RefreshSession> {
        let session = NewRefreshSession::new(user_id, token_family, version, raw_token, ttl)?;
        self.insert(session).await
    }

    /// Most recently created active session for the user.
    async fn find_active_for_user(&self, user_id: Uuid) -> Result<Option<RefreshSession>>;

    /// All active sessions for the user, newest first.
    async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshSession>>;

    /// Any session, revoked or not, whose stored hash equals `token_hash`.
    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<RefreshSession>>;

    /// Mark one session revoked. Returns false if it was already revoked or missing.
    async fn revoke(&self, session_id: Uuid) -> Result<bool>;

    /// Revoke every unrevoked session of the user and return how many changed.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Revoke `session_id` and insert `successor` as one atomic step.
    ///
    /// Returns `None` without inserting anything when the session was already
    /// revoked, so exactly one of two concurrent rotations wins.
    async fn rotate(
        &self,
        session_id: Uuid,
        successor: NewRefreshSession,
    ) -> Result<Option<RefreshSession>>;
}
