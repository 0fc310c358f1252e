//! Credential verification and refresh-token rotation.

pub mod config;
pub mod directory;
pub mod error;
pub mod issuer;
pub mod lockout;
pub mod memory;
pub mod password;
pub mod store;
pub mod token;

pub use config::AuthConfig;
pub use directory::{Account, LockoutUpdate, Role, UserDirectory};
pub use error::AuthError;
pub use issuer::{LoginOutcome, Principal, RefreshPrincipal, SessionIssuer, TokenPair};
pub use lockout::{LockoutPolicy, LockoutState};
pub use password::{CredentialVerifier, hash_password, verify_password};
pub use store::{NewRefreshSession, RefreshSession, RefreshTokenStore};
pub use token::{AccessClaims, RefreshClaims, TokenClaims, TokenCodec, TokenError};
