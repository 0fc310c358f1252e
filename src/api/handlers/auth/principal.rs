//! Request extractors that turn a presented token into a typed principal.
//!
//! Access tokens are read from the `Authorization: Bearer` header first, then
//! the `access_token` cookie. Refresh tokens come from the `refresh_token`
//! cookie first so a bearer access token sent alongside it is ignored.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use super::{
    cookies::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, extract_bearer_token, extract_cookie},
    error::ApiError,
};
use crate::auth::{Principal, RefreshPrincipal, SessionIssuer};

fn issuer(parts: &Parts) -> Result<Arc<SessionIssuer>, ApiError> {
    parts
        .extensions
        .get::<Arc<SessionIssuer>>()
        .cloned()
        .ok_or(ApiError::Misconfigured("session issuer extension missing"))
}

/// Caller authenticated by a valid access token.
#[derive(Clone, Debug)]
pub struct AccessPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AccessPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let issuer = issuer(parts)?;
        let token = extract_bearer_token(&parts.headers)
            .or_else(|| extract_cookie(&parts.headers, ACCESS_COOKIE_NAME))
            .ok_or(ApiError::MissingToken)?;
        Ok(Self(issuer.authenticate_access(&token)?))
    }
}

/// Caller presenting a refresh token, with the raw token kept for rotation.
#[derive(Clone)]
pub struct RefreshCredential {
    pub principal: RefreshPrincipal,
    pub token: String,
}

impl std::fmt::Debug for RefreshCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCredential")
            .field("principal", &self.principal)
            .field("token", &"***")
            .finish()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RefreshCredential
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let issuer = issuer(parts)?;
        let token = extract_cookie(&parts.headers, REFRESH_COOKIE_NAME)
            .or_else(|| extract_bearer_token(&parts.headers))
            .ok_or(ApiError::MissingToken)?;
        let principal = issuer.authenticate_refresh(&token)?;
        Ok(Self { principal, token })
    }
}
