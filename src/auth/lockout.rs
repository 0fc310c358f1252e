//! Progressive account lockout.
//!
//! Pure decisions over the failure counter and lock timestamp; persistence is
//! the verifier's job.

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct LockoutState {
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    max_attempts: u32,
    lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::minutes(DEFAULT_LOCKOUT_MINUTES),
        )
    }
}

impl LockoutPolicy {
    /// A zero `max_attempts` is treated as 1 so the policy always locks eventually.
    #[must_use]
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout_duration,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        self.lockout_duration
    }

    /// True while `locked_until` lies strictly in the future.
    #[must_use]
    pub fn is_locked(state: &LockoutState, now: DateTime<Utc>) -> bool {
        state.locked_until.is_some_and(|until| until > now)
    }

    /// State after one more failed attempt.
    ///
    /// A lock that is still in force is never moved. Once it has expired, reaching
    /// the threshold again starts a new full window.
    #[must_use]
    pub fn on_failure(&self, state: &LockoutState, now: DateTime<Utc>) -> LockoutState {
        let failed_login_attempts = state.failed_login_attempts.saturating_add(1);
        let locked_until = if Self::is_locked(state, now) {
            state.locked_until
        } else if failed_login_attempts >= self.max_attempts {
            // Saturate instead of overflowing; an unreachable expiry still locks.
            Some(
                now.checked_add_signed(self.lockout_duration)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            )
        } else {
            state.locked_until
        };

        LockoutState {
            failed_login_attempts,
            locked_until,
        }
    }

    #[must_use]
    pub fn on_success() -> LockoutState {
        LockoutState::default()
    }
}
