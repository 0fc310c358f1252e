//! HTTP mapping for auth failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::types::ErrorResponse;
use crate::auth::AuthError;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest(&'static str),
    MissingToken,
    Misconfigured(&'static str),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::AccountLocked { .. }) => StatusCode::FORBIDDEN,
            Self::Auth(AuthError::StorageFailure(_)) | Self::Misconfigured(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Auth(_) | Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Auth(AuthError::StorageFailure(source)) => {
                error!("Auth storage failure: {source:#}");
                ErrorResponse {
                    error: "storage_failure".to_string(),
                    message: "internal server error".to_string(),
                }
            }
            Self::Auth(err) => ErrorResponse {
                error: err.code().to_string(),
                message: err.to_string(),
            },
            Self::BadRequest(message) => ErrorResponse {
                error: "bad_request".to_string(),
                message: (*message).to_string(),
            },
            Self::MissingToken => ErrorResponse {
                error: "missing_token".to_string(),
                message: "authentication required".to_string(),
            },
            Self::Misconfigured(what) => {
                error!("Auth handler misconfigured: {what}");
                ErrorResponse {
                    error: "internal".to_string(),
                    message: "internal server error".to_string(),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
