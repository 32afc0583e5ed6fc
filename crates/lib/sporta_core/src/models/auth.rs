//! Authentication domain models.
//!
//! These are internal domain models, distinct from the request/response
//! shapes in `sporta_api::models`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Domain user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub gender: String,
    pub birth_date: NaiveDate,
    pub height_cm: Option<i32>,
    pub weight_kg: Option<i32>,
    pub sport_activity_level_id: Option<i64>,
    pub town_id: Option<i64>,
    pub role_id: Option<i64>,
    pub phone_number: String,
    pub is_phone_verified: bool,
    pub email: String,
    pub is_email_verified: bool,
    pub is_have_injury: bool,
    pub injury_description: Option<String>,
    pub photo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The subset of a user needed to check a password.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
}

/// Raw registration input, before parsing and hashing.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub surname: String,
    pub gender: String,
    /// Birth date in the configured format (day-month-year by default).
    pub birth_date: String,
    pub height_cm: Option<i32>,
    pub weight_kg: Option<i32>,
    pub sport_activity_level_id: Option<i64>,
    pub town_id: Option<i64>,
    pub role_id: Option<i64>,
    pub phone_number: String,
    pub email: String,
    pub password: String,
    pub is_have_injury: bool,
    pub injury_description: Option<String>,
    pub photo: Option<String>,
}

/// A user row ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub surname: String,
    pub gender: String,
    pub birth_date: NaiveDate,
    pub height_cm: Option<i32>,
    pub weight_kg: Option<i32>,
    pub sport_activity_level_id: Option<i64>,
    pub town_id: Option<i64>,
    /// `None` lets the store apply its default role.
    pub role_id: Option<i64>,
    pub phone_number: String,
    pub email: String,
    pub password_hash: String,
    pub is_have_injury: bool,
    pub injury_description: Option<String>,
    pub photo: Option<String>,
}

/// Email + password login input.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Logout input: the requesting user and the refresh token to revoke.
#[derive(Debug, Clone)]
pub struct LogoutRequest {
    pub user_id: i64,
    pub refresh_token: String,
}

/// Refresh token record stored in the database.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Which kind of token a claim set belongs to, carried in the `sub` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSubject {
    Access,
    Refresh,
}

impl TokenSubject {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenSubject::Access => "access",
            TokenSubject::Refresh => "refresh",
        }
    }
}

/// JWT claims shared by access and refresh tokens.
///
/// Refresh tokens leave `email` empty and `permissions` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// `"access"` or `"refresh"`.
    pub sub: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Not before (unix timestamp).
    pub nbf: i64,
    /// Unique token ID.
    pub jti: String,
}

/// A signed token together with the moment it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Access + refresh pair handed back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of confirming an OTP challenge.
#[derive(Debug, Clone, PartialEq)]
pub struct OtpConfirmation {
    pub confirmed: bool,
    /// Whether a user owns the confirmed phone number.
    pub registered: bool,
    /// Present only when `registered` is true.
    pub tokens: Option<TokenPair>,
}
