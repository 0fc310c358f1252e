use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Failure kinds surfaced by login, refresh, logout, and token verification.
///
/// Every variant is terminal for the request. The transport maps them to
/// distinct status codes; only `StorageFailure` carries internal detail, and
/// that detail is logged rather than returned to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email, inactive account, or wrong password. Deliberately a single
    /// variant so callers cannot probe which emails are registered.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked until {}", .until.to_rfc3339_opts(SecondsFormat::Secs, true))]
    AccountLocked { until: DateTime<Utc> },
    #[error("no valid refresh session")]
    NoValidSession,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("storage failure")]
    StorageFailure(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountLocked { .. } => "account_locked",
            Self::NoValidSession => "no_valid_session",
            Self::UserNotFound => "user_not_found",
            Self::InvalidRefreshToken => "invalid_refresh_token",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
            Self::StorageFailure(_) => "storage_failure",
        }
    }
}
