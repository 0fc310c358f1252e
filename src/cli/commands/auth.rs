use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command, builder::BoolishValueParser, builder::ValueParser};
use secrecy::SecretString;

use crate::auth::{
    AuthConfig,
    config::{MAX_LOCKOUT_MINUTES, MAX_TTL_SECONDS},
};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_EXPIRATION: &str = "jwt-access-expiration";
pub const ARG_REFRESH_EXPIRATION: &str = "jwt-refresh-expiration";
pub const ARG_MAX_LOGIN_ATTEMPTS: &str = "max-login-attempts";
pub const ARG_LOCKOUT_DURATION_MINUTES: &str = "lockout-duration-minutes";
pub const ARG_BCRYPT_ROUNDS: &str = "bcrypt-rounds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

/// Parse `90`, `30s`, `15m`, `12h`, or `7d` into seconds, up to 365 days.
///
/// # Errors
/// Returns an error string for empty, non-positive, oversized, or
/// unknown-suffix input.
pub fn parse_duration_seconds(value: &str) -> std::result::Result<i64, String> {
    let value = value.trim();
    let (digits, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], Some(c)),
        Some(_) => (value, None),
        None => return Err("duration must not be empty".to_string()),
    };
    let amount: i64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    let multiplier = match unit {
        None | Some('s') => 1,
        Some('m') => 60,
        Some('h') => 60 * 60,
        Some('d') => 24 * 60 * 60,
        Some(other) => return Err(format!("unknown duration unit '{other}' in {value}")),
    };
    let seconds = amount
        .checked_mul(multiplier)
        .filter(|seconds| *seconds <= MAX_TTL_SECONDS)
        .ok_or_else(|| format!("duration too large (max 365d): {value}"))?;
    if seconds <= 0 {
        return Err(format!("duration must be positive: {value}"));
    }
    Ok(seconds)
}

#[must_use]
pub fn validator_duration() -> ValueParser {
    ValueParser::from(parse_duration_seconds)
}

/// Bcrypt cost argument, shared by the server and `hash-password`.
#[must_use]
pub fn bcrypt_rounds_arg() -> Arg {
    Arg::new(ARG_BCRYPT_ROUNDS)
        .long(ARG_BCRYPT_ROUNDS)
        .help("Bcrypt cost factor for password hashing")
        .env("BCRYPT_ROUNDS")
        .default_value("12")
        .value_parser(clap::value_parser!(u32).range(4..=31))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC key used to sign access and refresh tokens")
                .env("JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_EXPIRATION)
                .long(ARG_ACCESS_EXPIRATION)
                .help("Access token lifetime (e.g. 900, 15m, 1h)")
                .env("JWT_ACCESS_EXPIRATION")
                .default_value("15m")
                .value_parser(validator_duration()),
        )
        .arg(
            Arg::new(ARG_REFRESH_EXPIRATION)
                .long(ARG_REFRESH_EXPIRATION)
                .help("Refresh token lifetime (e.g. 7d)")
                .env("JWT_REFRESH_EXPIRATION")
                .default_value("7d")
                .value_parser(validator_duration()),
        )
        .arg(
            Arg::new(ARG_MAX_LOGIN_ATTEMPTS)
                .long(ARG_MAX_LOGIN_ATTEMPTS)
                .help("Failed logins before the account is locked")
                .env("MAX_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_DURATION_MINUTES)
                .long(ARG_LOCKOUT_DURATION_MINUTES)
                .help("How long a locked account stays locked, in minutes")
                .env("LOCKOUT_DURATION_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_LOCKOUT_MINUTES)),
        )
        .arg(bcrypt_rounds_arg())
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark token cookies Secure (serve over HTTPS)")
                .env("CLINIC_AUTH_COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub max_login_attempts: u32,
    pub lockout_duration_minutes: i64,
    pub bcrypt_rounds: u32,
    pub cookie_secure: bool,
}

impl Options {
    /// Extract auth options from validated matches.
    ///
    /// # Errors
    /// Returns an error if the signing key is missing or empty.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|secret| !secret.is_empty())
            .cloned()
            .context("missing required argument: --jwt-secret")?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            access_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_EXPIRATION)
                .copied()
                .unwrap_or(15 * 60),
            refresh_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_EXPIRATION)
                .copied()
                .unwrap_or(7 * 24 * 60 * 60),
            max_login_attempts: matches
                .get_one::<u32>(ARG_MAX_LOGIN_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            lockout_duration_minutes: matches
                .get_one::<i64>(ARG_LOCKOUT_DURATION_MINUTES)
                .copied()
                .unwrap_or(30),
            bcrypt_rounds: matches
                .get_one::<u32>(ARG_BCRYPT_ROUNDS)
                .copied()
                .unwrap_or(12),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
        })
    }

    #[must_use]
    pub fn into_config(self) -> AuthConfig {
        AuthConfig::new(self.jwt_secret)
            .with_access_ttl_seconds(self.access_ttl_seconds)
            .with_refresh_ttl_seconds(self.refresh_ttl_seconds)
            .with_max_login_attempts(self.max_login_attempts)
            .with_lockout_duration_minutes(self.lockout_duration_minutes)
            .with_bcrypt_cost(self.bcrypt_rounds)
            .with_cookie_secure(self.cookie_secure)
    }
}
