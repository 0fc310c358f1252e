//! Session issuance, rotation, and revocation.
//!
//! Flow Overview:
//! 1) `login` authenticates, opens a new token family at version 1, and records
//!    the refresh token before handing out the pair.
//! 2) `refresh` matches the presented token against the user's active sessions,
//!    then revokes it and records its successor (same family, next version) in
//!    one step.
//! 3) `logout` revokes every session of the user.
//!
//! Security boundary:
//! - A revoked session is never matched again, so a redeemed or logged-out
//!   refresh token is dead.
//! - A mismatched token revokes nothing.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    config::AuthConfig,
    directory::{Account, Role, UserDirectory},
    error::AuthError,
    password::CredentialVerifier,
    store::{NewRefreshSession, RefreshSession, RefreshTokenStore, hash_refresh_token},
    token::{AccessClaims, RefreshClaims, TokenCodec, TokenError},
};

#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .finish()
    }
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub account: Account,
}

/// Identity carried by a verified access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub session_id: Uuid,
}

/// Identity carried by a verified refresh token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshPrincipal {
    pub user_id: Uuid,
    pub token_family: Uuid,
    pub version: u32,
}

pub struct SessionIssuer {
    directory: Arc<dyn UserDirectory>,
    store: Arc<dyn RefreshTokenStore>,
    verifier: CredentialVerifier,
    access: TokenCodec<AccessClaims>,
    refresh: TokenCodec<RefreshClaims>,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        directory: Arc<dyn UserDirectory>,
        store: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        let verifier = CredentialVerifier::new(
            directory.clone(),
            config.lockout_policy(),
            config.bcrypt_cost(),
        );
        Self {
            directory,
            store,
            verifier,
            access: TokenCodec::new(config.jwt_secret().clone(), config.access_ttl()),
            refresh: TokenCodec::new(config.jwt_secret().clone(), config.refresh_ttl()),
        }
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access.ttl()
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl()
    }

    /// Authenticate and issue a fresh token pair in a new family.
    ///
    /// # Errors
    /// Any credential error from the verifier, or `StorageFailure` if the
    /// refresh session cannot be recorded.
    pub async fn login(&self, email: &str, secret: &str) -> Result<LoginOutcome, AuthError> {
        let account = self.verifier.authenticate(email, secret).await?;
        let family = Uuid::new_v4();
        let tokens = self.mint_pair(&account, family, 1)?;

        self.store
            .record(account.id, family, 1, &tokens.refresh_token, self.refresh_ttl())
            .await?;

        info!(user_id = %account.id, token_family = %family, "Login succeeded");
        Ok(LoginOutcome { tokens, account })
    }

    /// Redeem `presented` for a new pair.
    ///
    /// # Errors
    /// `UserNotFound` for a missing or inactive user, `NoValidSession` when the
    /// user has no active session, `InvalidRefreshToken` when the token matches
    /// none of them or lost a concurrent rotation, `StorageFailure` otherwise.
    pub async fn refresh(&self, user_id: Uuid, presented: &str) -> Result<TokenPair, AuthError> {
        let account = self
            .directory
            .find_by_id(user_id)
            .await?
            .filter(|account| account.is_active)
            .ok_or(AuthError::UserNotFound)?;

        let sessions = self.store.list_active_for_user(user_id).await?;
        if sessions.is_empty() {
            return Err(AuthError::NoValidSession);
        }

        let Some(current) = sessions.into_iter().find(|s| s.matches(presented)) else {
            self.note_replay(user_id, presented).await;
            return Err(AuthError::InvalidRefreshToken);
        };

        let version = current.version.saturating_add(1);
        let tokens = self.mint_pair(&account, current.token_family, version)?;
        let successor = NewRefreshSession::new(
            user_id,
            current.token_family,
            version,
            &tokens.refresh_token,
            self.refresh_ttl(),
        )?;

        if self.store.rotate(current.id, successor).await?.is_none() {
            debug!(user_id = %user_id, session_id = %current.id, "Lost refresh rotation race");
            return Err(AuthError::InvalidRefreshToken);
        }

        debug!(
            user_id = %user_id,
            token_family = %current.token_family,
            version,
            "Refresh token rotated"
        );
        Ok(tokens)
    }

    /// Revoke every session of the user.
    ///
    /// # Errors
    /// `UserNotFound` if the user does not exist, `StorageFailure` otherwise.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AuthError> {
        if self.directory.find_by_id(user_id).await?.is_none() {
            return Err(AuthError::UserNotFound);
        }
        let revoked = self.store.revoke_all_for_user(user_id).await?;
        info!(user_id = %user_id, revoked, "Logout");
        Ok(())
    }

    /// Verify an access token.
    ///
    /// # Errors
    /// `TokenExpired` or `TokenInvalid`.
    pub fn authenticate_access(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.access.verify(token)?;
        Ok(Principal {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            session_id: claims.session_id,
        })
    }

    /// Verify a refresh token.
    ///
    /// # Errors
    /// `TokenExpired` or `TokenInvalid`.
    pub fn authenticate_refresh(&self, token: &str) -> Result<RefreshPrincipal, AuthError> {
        let claims = self.refresh.verify(token)?;
        Ok(RefreshPrincipal {
            user_id: claims.sub,
            token_family: claims.token_family,
            version: claims.version,
        })
    }

    /// Most recently created active session of the user, if any.
    ///
    /// # Errors
    /// `StorageFailure` if the store cannot be read.
    pub async fn active_session(
        &self,
        user_id: Uuid,
    ) -> Result<Option<RefreshSession>, AuthError> {
        Ok(self.store.find_active_for_user(user_id).await?)
    }

    fn mint_pair(
        &self,
        account: &Account,
        family: Uuid,
        version: u32,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_token = self
            .access
            .mint_at(
                &AccessClaims {
                    sub: account.id,
                    email: account.email.clone(),
                    role: account.role,
                    session_id: family,
                },
                now,
            )
            .map_err(mint_failed)?;
        let refresh_token = self
            .refresh
            .mint_at(
                &RefreshClaims {
                    sub: account.id,
                    token_family: family,
                    version,
                },
                now,
            )
            .map_err(mint_failed)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    async fn note_replay(&self, user_id: Uuid, presented: &str) {
        match self.store.find_by_token_hash(&hash_refresh_token(presented)).await {
            Ok(Some(session)) if session.is_revoked => {
                warn!(
                    user_id = %user_id,
                    token_family = %session.token_family,
                    version = session.version,
                    "Replay of a consumed refresh token"
                );
            }
            Ok(_) => debug!(user_id = %user_id, "Refresh token matched no session"),
            Err(err) => debug!(user_id = %user_id, "Replay lookup failed: {err:#}"),
        }
    }
}

fn mint_failed(err: TokenError) -> AuthError {
    AuthError::StorageFailure(anyhow::Error::new(err).context("failed to mint token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        memory::{MemoryDirectory, MemoryRefreshStore},
        password::hash_password,
    };
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        issuer: SessionIssuer,
        directory: Arc<MemoryDirectory>,
        store: Arc<MemoryRefreshStore>,
        account: Account,
    }

    async fn fixture() -> Result<Fixture> {
        let config =
            AuthConfig::new(SecretString::from("test-secret".to_string())).with_bcrypt_cost(4);
        let directory = Arc::new(MemoryDirectory::new());
        let store = Arc::new(MemoryRefreshStore::new());
        let account = Account::new(
            "doctor@clinic.com",
            hash_password("Doctor123!", 4).await?,
            Role::Doctor,
        );
        directory.upsert(account.clone()).await;
        let issuer = SessionIssuer::new(&config, directory.clone(), store.clone());
        Ok(Fixture {
            issuer,
            directory,
            store,
            account,
        })
    }

    /// Memory store whose writes can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryRefreshStore,
        fail_insert: AtomicBool,
        fail_rotate: AtomicBool,
    }

    #[async_trait]
    impl RefreshTokenStore for FlakyStore {
        async fn insert(&self, session: NewRefreshSession) -> Result<RefreshSession> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(anyhow!("insert refused"));
            }
            self.inner.insert(session).await
        }

        async fn find_active_for_user(&self, user_id: Uuid) -> Result<Option<RefreshSession>> {
            self.inner.find_active_for_user(user_id).await
        }

        async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshSession>> {
            self.inner.list_active_for_user(user_id).await
        }

        async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<RefreshSession>> {
            self.inner.find_by_token_hash(token_hash).await
        }

        async fn revoke(&self, session_id: Uuid) -> Result<bool> {
            self.inner.revoke(session_id).await
        }

        async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
            self.inner.revoke_all_for_user(user_id).await
        }

        async fn rotate(
            &self,
            session_id: Uuid,
            successor: NewRefreshSession,
        ) -> Result<Option<RefreshSession>> {
            if self.fail_rotate.load(Ordering::SeqCst) {
                return Err(anyhow!("rotate refused"));
            }
            self.inner.rotate(session_id, successor).await
        }
    }

    async fn flaky_issuer() -> Result<(SessionIssuer, Arc<FlakyStore>, Account)> {
        let config =
            AuthConfig::new(SecretString::from("test-secret".to_string())).with_bcrypt_cost(4);
        let directory = Arc::new(MemoryDirectory::new());
        let account = Account::new(
            "doctor@clinic.com",
            hash_password("Doctor123!", 4).await?,
            Role::Doctor,
        );
        directory.upsert(account.clone()).await;
        let store = Arc::new(FlakyStore::default());
        let issuer = SessionIssuer::new(&config, directory, store.clone());
        Ok((issuer, store, account))
    }

    #[tokio::test]
    async fn login_yields_no_pair_when_recording_fails() -> Result<()> {
        let (issuer, store, account) = flaky_issuer().await?;
        store.fail_insert.store(true, Ordering::SeqCst);

        let result = issuer.login("doctor@clinic.com", "Doctor123!").await;
        assert!(matches!(result, Err(AuthError::StorageFailure(_))));
        assert!(store.inner.sessions_for_user(account.id).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_yields_no_pair_when_rotation_fails() -> Result<()> {
        let (issuer, store, account) = flaky_issuer().await?;
        let outcome = issuer.login("doctor@clinic.com", "Doctor123!").await?;
        store.fail_rotate.store(true, Ordering::SeqCst);

        let result = issuer
            .refresh(account.id, &outcome.tokens.refresh_token)
            .await;
        assert!(matches!(result, Err(AuthError::StorageFailure(_))));

        // The presented token was not consumed.
        store.fail_rotate.store(false, Ordering::SeqCst);
        issuer
            .refresh(account.id, &outcome.tokens.refresh_token)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn oversized_durations_do_not_break_login() -> Result<()> {
        let config = AuthConfig::new(SecretString::from("test-secret".to_string()))
            .with_bcrypt_cost(4)
            .with_max_login_attempts(1)
            .with_refresh_ttl_seconds(100_000_000_000_000)
            .with_access_ttl_seconds(i64::MAX)
            .with_lockout_duration_minutes(1_000_000_000_000);
        let directory = Arc::new(MemoryDirectory::new());
        let account = Account::new(
            "admin@clinic.com",
            hash_password("Admin123!", 4).await?,
            Role::Admin,
        );
        directory.upsert(account.clone()).await;
        let store = Arc::new(MemoryRefreshStore::new());
        let issuer = SessionIssuer::new(&config, directory.clone(), store);

        let outcome = issuer.login("admin@clinic.com", "Admin123!").await?;
        issuer.authenticate_refresh(&outcome.tokens.refresh_token)?;

        let result = issuer.login("admin@clinic.com", "wrong").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        let locked = directory.get(account.id).await;
        assert!(locked.and_then(|a| a.locked_until).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn login_issues_pair_and_records_family() -> Result<()> {
        let f = fixture().await?;
        let outcome = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;
        assert_eq!(outcome.account.role, Role::Doctor);

        let principal = f.issuer.authenticate_access(&outcome.tokens.access_token)?;
        assert_eq!(principal.user_id, f.account.id);
        assert_eq!(principal.role, Role::Doctor);

        let refresh = f.issuer.authenticate_refresh(&outcome.tokens.refresh_token)?;
        assert_eq!(refresh.version, 1);
        assert_eq!(refresh.token_family, principal.session_id);

        let sessions = f.store.sessions_for_user(f.account.id).await;
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].matches(&outcome.tokens.refresh_token));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_keeps_family_and_bumps_version() -> Result<()> {
        let f = fixture().await?;
        let outcome = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;
        let first = f.issuer.authenticate_refresh(&outcome.tokens.refresh_token)?;

        let pair = f
            .issuer
            .refresh(f.account.id, &outcome.tokens.refresh_token)
            .await?;
        let second = f.issuer.authenticate_refresh(&pair.refresh_token)?;
        assert_eq!(second.token_family, first.token_family);
        assert_eq!(second.version, 2);

        let active = f.issuer.active_session(f.account.id).await?;
        assert!(active.is_some_and(|s| s.matches(&pair.refresh_token)));
        Ok(())
    }

    #[tokio::test]
    async fn redeemed_token_cannot_be_reused() -> Result<()> {
        let f = fixture().await?;
        let outcome = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;
        f.issuer
            .refresh(f.account.id, &outcome.tokens.refresh_token)
            .await?;
        let result = f
            .issuer
            .refresh(f.account.id, &outcome.tokens.refresh_token)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
        Ok(())
    }

    #[tokio::test]
    async fn mismatch_revokes_nothing() -> Result<()> {
        let f = fixture().await?;
        let outcome = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;
        let result = f.issuer.refresh(f.account.id, "garbage").await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
        f.issuer
            .refresh(f.account.id, &outcome.tokens.refresh_token)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn refresh_without_sessions_is_no_valid_session() -> Result<()> {
        let f = fixture().await?;
        let result = f.issuer.refresh(f.account.id, "anything").await;
        assert!(matches!(result, Err(AuthError::NoValidSession)));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_for_unknown_or_inactive_user() -> Result<()> {
        let f = fixture().await?;
        let result = f.issuer.refresh(Uuid::new_v4(), "anything").await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));

        let outcome = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;
        let mut inactive = f.account.clone();
        inactive.is_active = false;
        f.directory.upsert(inactive).await;
        let result = f
            .issuer
            .refresh(f.account.id, &outcome.tokens.refresh_token)
            .await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn logout_revokes_all_and_is_idempotent() -> Result<()> {
        let f = fixture().await?;
        let first = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;
        let second = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;

        f.issuer.logout(f.account.id).await?;
        f.issuer.logout(f.account.id).await?;

        for token in [&first.tokens.refresh_token, &second.tokens.refresh_token] {
            let result = f.issuer.refresh(f.account.id, token).await;
            assert!(matches!(result, Err(AuthError::NoValidSession)));
        }
        let result = f.issuer.logout(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn sessions_on_two_devices_rotate_independently() -> Result<()> {
        let f = fixture().await?;
        let laptop = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;
        let phone = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;

        f.issuer
            .refresh(f.account.id, &laptop.tokens.refresh_token)
            .await?;
        f.issuer
            .refresh(f.account.id, &phone.tokens.refresh_token)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn access_token_is_not_accepted_as_refresh() -> Result<()> {
        let f = fixture().await?;
        let outcome = f.issuer.login("doctor@clinic.com", "Doctor123!").await?;
        assert!(matches!(
            f.issuer.authenticate_refresh(&outcome.tokens.access_token),
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            f.issuer.authenticate_access(&outcome.tokens.refresh_token),
            Err(AuthError::TokenInvalid)
        ));
        Ok(())
    }
}
