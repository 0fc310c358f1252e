//! In-memory directory and refresh store for tests and local development.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    directory::{Account, LockoutUpdate, UserDirectory},
    store::{NewRefreshSession, RefreshSession, RefreshTokenStore},
};

#[derive(Default)]
pub struct MemoryDirectory {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub async fn upsert(&self, account: Account) {
        self.accounts.lock().await.insert(account.id, account);
    }

    pub async fn get(&self, id: Uuid) -> Option<Account> {
        self.accounts.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn update_lockout_state(
        &self,
        id: Uuid,
        expected_failed_attempts: u32,
        update: &LockoutUpdate,
    ) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(false);
        };
        if account.failed_login_attempts != expected_failed_attempts {
            return Ok(false);
        }
        account.failed_login_attempts = update.failed_login_attempts;
        account.locked_until = update.locked_until;
        if let Some(at) = update.last_login_at {
            account.last_login_at = Some(at);
        }
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryRefreshStore {
    sessions: Mutex<Vec<RefreshSession>>,
}

impl MemoryRefreshStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session of the user, revoked or not, in insertion order.
    pub async fn sessions_for_user(&self, user_id: Uuid) -> Vec<RefreshSession> {
        self.sessions
            .lock()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }
}

fn newest_first(mut sessions: Vec<RefreshSession>) -> Vec<RefreshSession> {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sessions
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshStore {
    async fn insert(&self, session: NewRefreshSession) -> Result<RefreshSession> {
        let session = session.into_session(Utc::now());
        self.sessions.lock().await.push(session.clone());
        Ok(session)
    }

    async fn find_active_for_user(&self, user_id: Uuid) -> Result<Option<RefreshSession>> {
        Ok(self.list_active_for_user(user_id).await?.into_iter().next())
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshSession>> {
        let now = Utc::now();
        let active = self
            .sessions
            .lock()
            .await
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id && s.is_active(now))
            .cloned()
            .collect();
        Ok(newest_first(active))
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<RefreshSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .iter()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions
            .iter_mut()
            .find(|s| s.id == session_id && !s.is_revoked)
            .map(|s| s.is_revoked = true)
            .is_some())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let mut revoked = 0;
        for session in sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id && !s.is_revoked)
        {
            session.is_revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        successor: NewRefreshSession,
    ) -> Result<Option<RefreshSession>> {
        let mut sessions = self.sessions.lock().await;
        let Some(current) = sessions
            .iter_mut()
            .find(|s| s.id == session_id && !s.is_revoked)
        else {
            return Ok(None);
        };
        current.is_revoked = true;
        let successor = successor.into_session(Utc::now());
        sessions.push(successor.clone());
        Ok(Some(successor))
    }
}
