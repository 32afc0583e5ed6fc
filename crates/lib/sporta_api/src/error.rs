//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sporta_core::auth::AuthError;
use sporta_core::store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Email/password sign-in failed. Unknown email and wrong password
    /// render identically.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Missing permissions: {0:?}")]
    MissingPermissions(Vec<String>),

    /// A domain rejection with its own error code.
    #[error("{code}: {message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    fn rejected(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        AppError::Rejected {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut missing = None;
        let (status, error, message) = match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid email or password".to_string(),
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m),
            AppError::MissingPermissions(perms) => {
                missing = Some(perms);
                (
                    StatusCode::FORBIDDEN,
                    "insufficient_permissions",
                    "Insufficient permissions".to_string(),
                )
            }
            AppError::Rejected {
                status,
                code,
                message,
            } => (status, code, message),
            AppError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", m),
            AppError::Internal(detail) => {
                error!(error = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
            missing,
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        if e.is_cancelled() {
            return AppError::Unavailable("Request cancelled".into());
        }
        match e {
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Parse(msg) => {
                AppError::rejected(StatusCode::BAD_REQUEST, "parse_error", msg)
            }
            AuthError::InvalidToken(_) => {
                AppError::rejected(
                    StatusCode::UNAUTHORIZED,
                    "invalid_token",
                    "Invalid or expired token",
                )
            }
            AuthError::TokenOwnership => {
                AppError::Forbidden("Token does not belong to user".into())
            }
            AuthError::RefreshTokenNotFound => AppError::rejected(
                StatusCode::UNAUTHORIZED,
                "refresh_token_not_found",
                "Refresh token not found",
            ),
            AuthError::RefreshTokenRevoked => AppError::rejected(
                StatusCode::UNAUTHORIZED,
                "refresh_token_revoked",
                "Refresh token has been revoked",
            ),
            AuthError::RefreshTokenExpired => AppError::rejected(
                StatusCode::UNAUTHORIZED,
                "refresh_token_expired",
                "Refresh token has expired",
            ),
            AuthError::RefreshTokenInvalid => AppError::rejected(
                StatusCode::UNAUTHORIZED,
                "refresh_token_invalid",
                "Refresh token is no longer valid",
            ),
            AuthError::UserNotFound => AppError::NotFound("User not found".into()),
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::OtpInvalidOrExpired => AppError::rejected(
                StatusCode::BAD_REQUEST,
                "otp_invalid_or_expired",
                "OTP is invalid or expired",
            ),
            AuthError::OtpMismatch => {
                AppError::rejected(StatusCode::BAD_REQUEST, "otp_mismatch", "OTP does not match")
            }
            AuthError::OtpDelivery(msg) => {
                error!(error = %msg, "otp delivery failed");
                AppError::rejected(
                    StatusCode::BAD_GATEWAY,
                    "otp_delivery_failed",
                    "Could not send OTP",
                )
            }
            AuthError::Repository(StoreError::Conflict(_)) => {
                AppError::Conflict("User with this email or phone number already exists".into())
            }
            AuthError::TokenCreation(msg) => AppError::Internal(format!("token creation: {msg}")),
            AuthError::Repository(e) => AppError::Internal(format!("repository: {e}")),
            AuthError::Cache(e) => AppError::Internal(format!("cache: {e}")),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_user_is_not_found_outside_login() {
        let (status, body) = body_of(AuthError::UserNotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, body) = body_of(AuthError::InvalidCredentials.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[tokio::test]
    async fn internal_detail_is_hidden() {
        let (status, body) =
            body_of(AuthError::TokenCreation("redis down at 10.0.0.3".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn missing_permissions_are_listed() {
        let (status, body) =
            body_of(AppError::MissingPermissions(vec!["match.create".into()])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["missing"], serde_json::json!(["match.create"]));
    }

    #[tokio::test]
    async fn duplicate_registration_is_conflict() {
        let err = AuthError::Repository(StoreError::Conflict("users_email_live_key".into()));
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!body.to_string().contains("users_email_live_key"));
    }

    #[tokio::test]
    async fn cancellation_is_unavailable() {
        let (status, _) = body_of(AuthError::Repository(StoreError::Cancelled).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
