//! Account records and the user directory seam.
//!
//! The directory owns user profiles; the auth core only reads accounts and writes
//! back the lockout counters and login timestamp.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::lockout::LockoutState;

/// Fixed set of roles carried verbatim into access token claims.
#[derive(ToSchema, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Doctor,
    Staff,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Doctor => "DOCTOR",
            Self::Staff => "STAFF",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "ADMIN" => Ok(Self::Admin),
            "DOCTOR" => Ok(Self::Doctor),
            "STAFF" => Ok(Self::Staff),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A user account as seen by the auth core.
#[derive(Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub secret_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub password_changed_at: DateTime<Utc>,
}

impl Account {
    /// Fresh, active, unlocked account with a new id.
    #[must_use]
    pub fn new(email: impl Into<String>, secret_hash: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            secret_hash: secret_hash.into(),
            role,
            is_active: true,
            mfa_enabled: false,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            password_changed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn lockout_state(&self) -> LockoutState {
        LockoutState {
            failed_login_attempts: self.failed_login_attempts,
            locked_until: self.locked_until,
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("secret_hash", &"***")
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .field("mfa_enabled", &self.mfa_enabled)
            .field("failed_login_attempts", &self.failed_login_attempts)
            .field("locked_until", &self.locked_until)
            .field("last_login_at", &self.last_login_at)
            .field("password_changed_at", &self.password_changed_at)
            .finish()
    }
}

/// New lockout fields for an account. `last_login_at: None` leaves the stored
/// value untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutUpdate {
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl LockoutUpdate {
    #[must_use]
    pub fn from_state(state: LockoutState, last_login_at: Option<DateTime<Utc>>) -> Self {
        Self {
            failed_login_attempts: state.failed_login_attempts,
            locked_until: state.locked_until,
            last_login_at,
        }
    }
}

/// Lookup and lockout persistence provided by the user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Compare-and-swap write of the lockout fields.
    ///
    /// Applies `update` only if the stored counter still equals
    /// `expected_failed_attempts` and returns whether the row was written. A
    /// `false` result means another request changed the counter first.
    async fn update_lockout_state(
        &self,
        id: Uuid,
        expected_failed_attempts: u32,
        update: &LockoutUpdate,
    ) -> Result<bool>;
}
