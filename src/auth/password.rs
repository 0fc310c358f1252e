//! Password verification with progressive lockout.
//!
//! Flow Overview:
//! 1) Look up the account by email; unknown emails and inactive accounts still
//!    pay for a bcrypt verify.
//! 2) Refuse inactive or locked accounts before touching the password.
//! 3) Compare with bcrypt on the blocking pool.
//! 4) Persist the new lockout state with a compare-and-swap write, reloading on
//!    a lost race.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::{
    directory::{Account, LockoutUpdate, UserDirectory},
    error::AuthError,
    lockout::LockoutPolicy,
};

const CAS_ATTEMPTS: usize = 3;
const DUMMY_SECRET: &str = "clinic-auth-timing-equalizer";

/// Hash `secret` with bcrypt at the given cost.
///
/// # Errors
/// Returns an error if the cost is out of range or the blocking task fails.
pub async fn hash_password(secret: &str, cost: u32) -> Result<String> {
    let secret = secret.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost))
        .await
        .context("bcrypt hash task failed")?
        .context("failed to hash password")
}

/// Compare `secret` against a bcrypt hash. A malformed hash never matches.
///
/// # Errors
/// Returns an error only if the blocking task fails.
pub async fn verify_password(secret: &str, hash: &str) -> Result<bool> {
    let secret = secret.to_owned();
    let hash = hash.to_owned();
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash))
        .await
        .context("bcrypt verify task failed")?;
    match result {
        Ok(matched) => Ok(matched),
        Err(err) => {
            warn!("Stored password hash is unusable: {err}");
            Ok(false)
        }
    }
}

pub struct CredentialVerifier {
    directory: Arc<dyn UserDirectory>,
    policy: LockoutPolicy,
    hash_cost: u32,
    dummy_hash: OnceCell<String>,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>, policy: LockoutPolicy, hash_cost: u32) -> Self {
        Self {
            directory,
            policy,
            hash_cost,
            dummy_hash: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Check `email`/`secret` and return the account on success.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown email, inactive account, or wrong
    /// password; `AccountLocked` while a lock is in force; `StorageFailure` if
    /// the directory cannot be read or the success path cannot be persisted.
    pub async fn authenticate(&self, email: &str, secret: &str) -> Result<Account, AuthError> {
        let Some(mut account) = self.directory.find_by_email(email).await? else {
            self.equalize_timing(secret).await;
            debug!("Login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !account.is_active {
            self.equalize_timing(secret).await;
            debug!(user_id = %account.id, "Login attempt for inactive account");
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        if let Some(until) = locked_until(&account, now) {
            return Err(AuthError::AccountLocked { until });
        }

        let matched = verify_password(secret, &account.secret_hash).await?;

        for _ in 0..CAS_ATTEMPTS {
            let now = Utc::now();
            let expected = account.failed_login_attempts;

            if matched {
                // The account may have been deactivated or locked meanwhile.
                if !account.is_active {
                    debug!(user_id = %account.id, "Account deactivated during login");
                    return Err(AuthError::InvalidCredentials);
                }
                if let Some(until) = locked_until(&account, now) {
                    return Err(AuthError::AccountLocked { until });
                }
                let update =
                    LockoutUpdate::from_state(LockoutPolicy::on_success(), Some(now));
                if self
                    .directory
                    .update_lockout_state(account.id, expected, &update)
                    .await?
                {
                    account.failed_login_attempts = update.failed_login_attempts;
                    account.locked_until = update.locked_until;
                    account.last_login_at = update.last_login_at;
                    return Ok(account);
                }
            } else {
                let next = self.policy.on_failure(&account.lockout_state(), now);
                let update = LockoutUpdate::from_state(next, None);
                match self
                    .directory
                    .update_lockout_state(account.id, expected, &update)
                    .await
                {
                    Ok(true) => {
                        if next.locked_until != account.locked_until {
                            if let Some(until) = next.locked_until {
                                warn!(
                                    user_id = %account.id,
                                    failed_login_attempts = next.failed_login_attempts,
                                    "Account locked until {until}"
                                );
                            }
                        }
                        return Err(AuthError::InvalidCredentials);
                    }
                    Ok(false) => {}
                    Err(err) => {
                        error!(user_id = %account.id, "Failed to record failed login: {err:#}");
                        return Err(AuthError::InvalidCredentials);
                    }
                }
            }

            account = match self.directory.find_by_id(account.id).await {
                Ok(Some(reloaded)) => reloaded,
                Ok(None) => return Err(AuthError::InvalidCredentials),
                Err(err) if !matched => {
                    error!(user_id = %account.id, "Failed to reload account: {err:#}");
                    return Err(AuthError::InvalidCredentials);
                }
                Err(err) => return Err(err.into()),
            };
        }

        if matched {
            Err(AuthError::StorageFailure(anyhow::anyhow!(
                "lockout state kept changing for user {}",
                account.id
            )))
        } else {
            error!(user_id = %account.id, "Gave up recording failed login after concurrent updates");
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn equalize_timing(&self, secret: &str) {
        let hash = match self.dummy_hash.get() {
            Some(hash) => hash.clone(),
            None => match hash_password(DUMMY_SECRET, self.hash_cost).await {
                Ok(hash) => self.dummy_hash.get_or_init(|| hash).clone(),
                Err(err) => {
                    debug!("Failed to build timing hash: {err:#}");
                    return;
                }
            },
        };
        let _ = verify_password(secret, &hash).await;
    }
}

fn locked_until(account: &Account, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if LockoutPolicy::is_locked(&account.lockout_state(), now) {
        account.locked_until
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{directory::Role, memory::MemoryDirectory};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::Duration;
    use uuid::Uuid;

    const COST: u32 = 4;

    enum Interference {
        FailWrites,
        DeactivateOnWrite,
    }

    /// Reads pass through; lockout writes misbehave.
    struct InterferingDirectory {
        inner: Arc<MemoryDirectory>,
        mode: Interference,
    }

    #[async_trait]
    impl UserDirectory for InterferingDirectory {
        async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
            self.inner.find_by_id(id).await
        }

        async fn update_lockout_state(
            &self,
            id: Uuid,
            _expected_failed_attempts: u32,
            _update: &LockoutUpdate,
        ) -> Result<bool> {
            match self.mode {
                Interference::FailWrites => Err(anyhow!("connection reset")),
                Interference::DeactivateOnWrite => {
                    if let Some(mut account) = self.inner.get(id).await {
                        account.is_active = false;
                        self.inner.upsert(account).await;
                    }
                    Ok(false)
                }
            }
        }
    }

    async fn interfering_verifier(
        mode: Interference,
    ) -> Result<(CredentialVerifier, Arc<MemoryDirectory>, Account)> {
        let inner = Arc::new(MemoryDirectory::new());
        let account = Account::new(
            "nurse@clinic.com",
            hash_password("Staff123!", COST).await?,
            Role::Staff,
        );
        inner.upsert(account.clone()).await;
        let directory = Arc::new(InterferingDirectory {
            inner: inner.clone(),
            mode,
        });
        let verifier = CredentialVerifier::new(directory, LockoutPolicy::default(), COST);
        Ok((verifier, inner, account))
    }

    async fn verifier_with(
        email: &str,
        secret: &str,
        max_attempts: u32,
    ) -> Result<(CredentialVerifier, Arc<MemoryDirectory>, Account)> {
        let directory = Arc::new(MemoryDirectory::new());
        let account = Account::new(email, hash_password(secret, COST).await?, Role::Doctor);
        directory.upsert(account.clone()).await;
        let verifier = CredentialVerifier::new(
            directory.clone(),
            LockoutPolicy::new(max_attempts, Duration::minutes(30)),
            COST,
        );
        Ok((verifier, directory, account))
    }

    #[tokio::test]
    async fn hash_and_verify_round_trip() -> Result<()> {
        let hash = hash_password("Doctor123!", COST).await?;
        assert!(verify_password("Doctor123!", &hash).await?);
        assert!(!verify_password("doctor123!", &hash).await?);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_hash_never_matches() -> Result<()> {
        assert!(!verify_password("anything", "not-a-bcrypt-hash").await?);
        Ok(())
    }

    #[tokio::test]
    async fn correct_password_returns_account_and_stamps_login() -> Result<()> {
        let (verifier, directory, account) =
            verifier_with("doctor@clinic.com", "Doctor123!", 5).await?;
        let authenticated = verifier
            .authenticate("doctor@clinic.com", "Doctor123!")
            .await?;
        assert_eq!(authenticated.id, account.id);
        let stored = directory.get(account.id).await;
        assert!(stored.and_then(|a| a.last_login_at).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_is_invalid_credentials() -> Result<()> {
        let (verifier, _, _) = verifier_with("doctor@clinic.com", "Doctor123!", 5).await?;
        let result = verifier.authenticate("nobody@clinic.com", "Doctor123!").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn inactive_account_fails_closed_without_counting() -> Result<()> {
        let (verifier, directory, mut account) =
            verifier_with("staff@clinic.com", "Staff123!", 5).await?;
        account.is_active = false;
        directory.upsert(account.clone()).await;

        let result = verifier.authenticate("staff@clinic.com", "Staff123!").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        let stored = directory.get(account.id).await;
        assert_eq!(stored.map(|a| a.failed_login_attempts), Some(0));
        // Same bcrypt work as an unknown email.
        assert!(verifier.dummy_hash.get().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn failed_lockout_write_still_reports_invalid_credentials() -> Result<()> {
        let (verifier, directory, account) =
            interfering_verifier(Interference::FailWrites).await?;
        let result = verifier.authenticate("nurse@clinic.com", "wrong").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        let stored = directory.get(account.id).await;
        assert_eq!(stored.map(|a| a.failed_login_attempts), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn failed_success_write_is_storage_failure() -> Result<()> {
        let (verifier, _, _) = interfering_verifier(Interference::FailWrites).await?;
        let result = verifier.authenticate("nurse@clinic.com", "Staff123!").await;
        assert!(matches!(result, Err(AuthError::StorageFailure(_))));
        Ok(())
    }

    #[tokio::test]
    async fn account_deactivated_mid_login_is_rejected() -> Result<()> {
        let (verifier, directory, account) =
            interfering_verifier(Interference::DeactivateOnWrite).await?;
        let result = verifier.authenticate("nurse@clinic.com", "Staff123!").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        let stored = directory.get(account.id).await;
        assert!(stored.is_some_and(|a| !a.is_active && a.last_login_at.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_increments_counter_once() -> Result<()> {
        let (verifier, directory, account) =
            verifier_with("staff@clinic.com", "Staff123!", 5).await?;
        let result = verifier.authenticate("staff@clinic.com", "wrong").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        let stored = directory.get(account.id).await;
        assert_eq!(stored.map(|a| a.failed_login_attempts), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn threshold_failure_locks_and_blocks_correct_password() -> Result<()> {
        let (verifier, directory, account) =
            verifier_with("admin@clinic.com", "Admin123!", 3).await?;
        for _ in 0..3 {
            let result = verifier.authenticate("admin@clinic.com", "nope").await;
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        }
        let stored = directory.get(account.id).await;
        assert_eq!(stored.as_ref().map(|a| a.failed_login_attempts), Some(3));
        assert!(stored.and_then(|a| a.locked_until).is_some());

        let result = verifier.authenticate("admin@clinic.com", "Admin123!").await;
        assert!(matches!(result, Err(AuthError::AccountLocked { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn success_after_failures_resets_counter() -> Result<()> {
        let (verifier, directory, account) =
            verifier_with("staff@clinic.com", "Staff123!", 5).await?;
        for _ in 0..2 {
            let _ = verifier.authenticate("staff@clinic.com", "nope").await;
        }
        verifier.authenticate("staff@clinic.com", "Staff123!").await?;
        let stored = directory.get(account.id).await;
        assert_eq!(stored.as_ref().map(|a| a.failed_login_attempts), Some(0));
        assert!(stored.and_then(|a| a.locked_until).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() -> Result<()> {
        let (verifier, directory, account) =
            verifier_with("staff@clinic.com", "Staff123!", 50).await?;
        let verifier = Arc::new(verifier);
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let verifier = verifier.clone();
            tasks.push(tokio::spawn(async move {
                verifier.authenticate("staff@clinic.com", "nope").await
            }));
        }
        for task in tasks {
            let result = task.await?;
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        }
        let stored = directory.get(account.id).await;
        assert_eq!(stored.map(|a| a.failed_login_attempts), Some(3));
        Ok(())
    }
}
