//! Auth endpoints.
//!
//! Flow Overview:
//! - `POST /auth/login` verifies credentials and sets the `access_token` and
//!   `refresh_token` cookies.
//! - `POST /auth/refresh` redeems the refresh cookie for a new pair.
//! - `POST /auth/logout` revokes every refresh session of the caller and clears
//!   both cookies.
//! - `GET /auth/me` echoes the principal carried by the access token.

pub mod cookies;
pub mod error;
pub mod principal;
pub mod session;
pub mod types;

pub use error::ApiError;
pub use principal::{AccessPrincipal, RefreshCredential};
