use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Application error taxonomy. Every handler maps its failures into one of
/// these variants at the boundary; nothing propagates past the request.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("email or password incorrect")]
    InvalidCredentials,
    #[error("authentication required")]
    AuthRequired,
    #[error("access token expired")]
    TokenExpired,
    #[error("invalid access token")]
    InvalidToken,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("admin privileges required")]
    AdminRequired,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("provider profile has no usable id")]
    ProviderProfileInvalid,
    #[error("{0}")]
    UpstreamProvider(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials
            | AppError::AuthRequired
            | AppError::TokenExpired
            | AppError::RefreshTokenExpired => StatusCode::UNAUTHORIZED,
            AppError::InvalidToken
            | AppError::InvalidRefreshToken
            | AppError::AdminRequired => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ProviderProfileInvalid | AppError::UpstreamProvider(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::AuthRequired => "AUTH_REQUIRED",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            AppError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AppError::AdminRequired => "ADMIN_REQUIRED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::ProviderProfileInvalid => "PROVIDER_PROFILE_INVALID",
            AppError::UpstreamProvider(_) => "UPSTREAM_PROVIDER",
            AppError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Backend details stay in the server log.
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (
            self.status(),
            Json(ErrorResponse::new(self.code(), &message)),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AppError::Conflict("email already registered".into()),
            StoreError::NotFound => AppError::NotFound("record not found".into()),
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            AppError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidToken.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::RefreshTokenExpired.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::InvalidRefreshToken.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::AdminRequired.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn invalid_credentials_message_is_generic() {
        // Must never reveal which of email/password was wrong.
        let msg = AppError::InvalidCredentials.to_string();
        assert_eq!(msg, "email or password incorrect");
    }

    #[test]
    fn duplicate_email_maps_to_conflict() {
        let err: AppError = StoreError::DuplicateEmail.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "CONFLICT");
    }
}
