//! Persistence adapters.

pub mod postgres;

pub use postgres::{PgRefreshTokenStore, PgUserDirectory};
