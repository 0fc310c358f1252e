//! # clinic-auth (credential verification and session rotation)
//!
//! `clinic-auth` authenticates staff accounts (administrators, doctors, front-desk
//! staff) and manages the lifecycle of the access/refresh token pairs handed to
//! clients after login.
//!
//! ## Login
//!
//! Passwords are checked against a bcrypt hash held by the user directory. Repeated
//! failures lock the account for a configurable window; the lock expires on its own
//! and a successful login resets the failure counter.
//!
//! ## Tokens
//!
//! Access and refresh tokens are compact HS256 JWTs minted by two independent
//! codecs. Only a SHA-256 hash of each refresh token is persisted, keyed by user and
//! by the token family created at login.
//!
//! ## Rotation
//!
//! Refresh tokens are single use. Redeeming one revokes its stored record and
//! records a successor in the same family with the next version. A revoked record
//! can never be matched again, so replaying a consumed or logged-out token fails.

pub mod api;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
