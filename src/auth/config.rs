//! Runtime configuration for the auth core.

use chrono::Duration;
use secrecy::SecretString;
use std::fmt;

use super::lockout::{DEFAULT_LOCKOUT_MINUTES, DEFAULT_MAX_ATTEMPTS, LockoutPolicy};

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Longest accepted token lifetime (365 days).
pub const MAX_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;
/// Longest accepted lockout window (365 days).
pub const MAX_LOCKOUT_MINUTES: i64 = 365 * 24 * 60;

#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    max_login_attempts: u32,
    lockout_duration_minutes: i64,
    bcrypt_cost: u32,
    cookie_secure: bool,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("max_login_attempts", &self.max_login_attempts)
            .field("lockout_duration_minutes", &self.lockout_duration_minutes)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            max_login_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_duration_minutes: DEFAULT_LOCKOUT_MINUTES,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            cookie_secure: false,
        }
    }

    /// Clamped to `1..=MAX_TTL_SECONDS`.
    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds.clamp(1, MAX_TTL_SECONDS);
        self
    }

    /// Clamped to `1..=MAX_TTL_SECONDS`.
    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds.clamp(1, MAX_TTL_SECONDS);
        self
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_duration_minutes(mut self, minutes: i64) -> Self {
        self.lockout_duration_minutes = minutes.clamp(1, MAX_LOCKOUT_MINUTES);
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_seconds)
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(
            self.max_login_attempts,
            Duration::minutes(self.lockout_duration_minutes),
        )
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults() {
        let config = AuthConfig::new(SecretString::from("secret".to_string()));
        assert_eq!(config.access_ttl(), Duration::minutes(15));
        assert_eq!(config.refresh_ttl(), Duration::days(7));
        assert_eq!(config.lockout_policy().max_attempts(), 5);
        assert_eq!(
            config.lockout_policy().lockout_duration(),
            Duration::minutes(30)
        );
        assert_eq!(config.bcrypt_cost(), 12);
        assert!(!config.cookie_secure());
        assert_eq!(config.jwt_secret().expose_secret(), "secret");
    }

    #[test]
    fn builder_overrides() {
        let config = AuthConfig::new(SecretString::from("secret".to_string()))
            .with_access_ttl_seconds(60)
            .with_refresh_ttl_seconds(120)
            .with_max_login_attempts(3)
            .with_lockout_duration_minutes(1)
            .with_bcrypt_cost(4)
            .with_cookie_secure(true);
        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.refresh_ttl_seconds(), 120);
        assert_eq!(config.lockout_policy().max_attempts(), 3);
        assert_eq!(
            config.lockout_policy().lockout_duration(),
            Duration::minutes(1)
        );
        assert_eq!(config.bcrypt_cost(), 4);
        assert!(config.cookie_secure());
    }

    #[test]
    fn out_of_range_durations_are_clamped() {
        let config = AuthConfig::new(SecretString::from("secret".to_string()))
            .with_access_ttl_seconds(0)
            .with_refresh_ttl_seconds(100_000_000_000_000)
            .with_lockout_duration_minutes(i64::MAX);
        assert_eq!(config.access_ttl_seconds(), 1);
        assert_eq!(config.refresh_ttl_seconds(), MAX_TTL_SECONDS);
        assert_eq!(config.refresh_ttl(), Duration::days(365));
        assert_eq!(
            config.lockout_policy().lockout_duration(),
            Duration::minutes(MAX_LOCKOUT_MINUTES)
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let config = AuthConfig::new(SecretString::from("do-not-print".to_string()));
        assert!(!format!("{config:?}").contains("do-not-print"));
    }
}
