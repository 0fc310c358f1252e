//! Login, refresh, logout, and current-principal endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{error, instrument};

use super::{
    cookies::{access_cookie, clear_access_cookie, clear_refresh_cookie, refresh_cookie},
    error::ApiError,
    principal::{AccessPrincipal, RefreshCredential},
    types::{
        AccountView, ErrorResponse, LoginRequest, LoginResponse, MessageResponse,
        PrincipalResponse,
    },
};
use crate::{
    api::handlers::valid_email,
    auth::{AuthConfig, SessionIssuer, TokenPair},
};

fn token_cookies(config: &AuthConfig, tokens: &TokenPair) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    let access = access_cookie(config, &tokens.access_token);
    let refresh = refresh_cookie(config, &tokens.refresh_token);
    match (access, refresh) {
        (Ok(access), Ok(refresh)) => {
            headers.append(SET_COOKIE, access);
            headers.append(SET_COOKIE, refresh);
            Ok(headers)
        }
        (Err(err), _) | (_, Err(err)) => {
            error!("Failed to build token cookie: {err}");
            Err(ApiError::Misconfigured("token cookie"))
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; token cookies set", body = LoginResponse),
        (status = 400, description = "Malformed email or empty password", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account locked", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    issuer: Extension<Arc<SessionIssuer>>,
    config: Extension<Arc<AuthConfig>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !valid_email(&request.email) {
        return Err(ApiError::BadRequest("invalid email"));
    }
    if request.password.is_empty() {
        return Err(ApiError::BadRequest("password is required"));
    }

    let outcome = issuer.login(&request.email, &request.password).await?;
    let headers = token_cookies(&config, &outcome.tokens)?;
    let body = LoginResponse {
        user: AccountView::from(&outcome.account),
        message: "Login successful".to_string(),
    };
    Ok((StatusCode::OK, headers, Json(body)))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Tokens rotated; cookies replaced", body = MessageResponse),
        (status = 401, description = "Missing, invalid, or consumed refresh token", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all, fields(user_id = %credential.principal.user_id))]
pub async fn refresh(
    issuer: Extension<Arc<SessionIssuer>>,
    config: Extension<Arc<AuthConfig>>,
    credential: RefreshCredential,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = issuer
        .refresh(credential.principal.user_id, &credential.token)
        .await?;
    let headers = token_cookies(&config, &tokens)?;
    Ok((
        StatusCode::OK,
        headers,
        Json(MessageResponse::new("Tokens refreshed successfully")),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "All sessions revoked; cookies cleared", body = MessageResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all, fields(user_id = %principal.0.user_id))]
pub async fn logout(
    issuer: Extension<Arc<SessionIssuer>>,
    config: Extension<Arc<AuthConfig>>,
    principal: AccessPrincipal,
) -> Result<impl IntoResponse, ApiError> {
    issuer.logout(principal.0.user_id).await?;

    let mut headers = HeaderMap::new();
    if let Ok(cookie) = clear_access_cookie(&config) {
        headers.append(SET_COOKIE, cookie);
    }
    if let Ok(cookie) = clear_refresh_cookie(&config) {
        headers.append(SET_COOKIE, cookie);
    }
    Ok((
        StatusCode::OK,
        headers,
        Json(MessageResponse::new("Logout successful")),
    ))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Principal carried by the access token", body = PrincipalResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me(principal: AccessPrincipal) -> impl IntoResponse {
    Json(PrincipalResponse::from(principal.0))
}
