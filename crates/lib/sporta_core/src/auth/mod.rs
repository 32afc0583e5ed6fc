//! Authentication and session logic.
//!
//! Token issuance and verification, password hashing, OTP challenges and
//! the [`session::SessionService`] that composes them over the credential
//! store and the ephemeral cache.

pub mod jwt;
pub mod otp;
pub mod password;
pub mod session;

use thiserror::Error;

use crate::cache::CacheError;
use crate::store::StoreError;

/// Authentication errors.
///
/// Variants are the internal kinds; the HTTP layer decides how each renders.
/// `UserNotFound` and `InvalidCredentials` in particular stay distinct here
/// even though clients see the same message for both.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token does not belong to the requesting user")]
    TokenOwnership,

    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    #[error("Refresh token revoked")]
    RefreshTokenRevoked,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Refresh token invalid")]
    RefreshTokenInvalid,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("OTP invalid or expired")]
    OtpInvalidOrExpired,

    #[error("OTP mismatch")]
    OtpMismatch,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Repository error: {0}")]
    Repository(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("OTP delivery failed: {0}")]
    OtpDelivery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable snake_case name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation",
            AuthError::Parse(_) => "parse",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TokenOwnership => "token_ownership",
            AuthError::RefreshTokenNotFound => "refresh_token_not_found",
            AuthError::RefreshTokenRevoked => "refresh_token_revoked",
            AuthError::RefreshTokenExpired => "refresh_token_expired",
            AuthError::RefreshTokenInvalid => "refresh_token_invalid",
            AuthError::UserNotFound => "user_not_found",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::OtpInvalidOrExpired => "otp_invalid_or_expired",
            AuthError::OtpMismatch => "otp_mismatch",
            AuthError::TokenCreation(_) => "token_creation",
            AuthError::Repository(_) => "repository",
            AuthError::Cache(_) => "cache",
            AuthError::OtpDelivery(_) => "otp_delivery",
            AuthError::Internal(_) => "internal",
        }
    }

    /// Whether the caller's cancellation token caused this error.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            AuthError::Repository(StoreError::Cancelled) | AuthError::Cache(CacheError::Cancelled)
        )
    }
}
