//! API handlers and shared request validation.

pub mod auth;
pub mod health;

use regex::Regex;

/// Lightweight email sanity check applied before any directory lookup.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}
