//! Request and response bodies. Field names are snake_case on the wire.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sporta_core::models::auth::{self as domain, OtpConfirmation, TokenPair, User};

/// Error body shared by every failing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Permissions the caller lacks; only set by the permission gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub surname: String,
    pub gender: String,
    /// `DD-MM-YYYY` unless configured otherwise.
    pub birth_date: String,
    #[serde(default)]
    pub height_cm: Option<i32>,
    #[serde(default)]
    pub weight_kg: Option<i32>,
    #[serde(default)]
    pub sport_activity_level_id: Option<i64>,
    #[serde(default)]
    pub town_id: Option<i64>,
    pub phone_number: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_have_injury: bool,
    #[serde(default)]
    pub injury_description: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

impl From<RegistrationRequest> for domain::Registration {
    fn from(r: RegistrationRequest) -> Self {
        // Clients cannot pick their own role.
        domain::Registration {
            name: r.name,
            surname: r.surname,
            gender: r.gender,
            birth_date: r.birth_date,
            height_cm: r.height_cm,
            weight_kg: r.weight_kg,
            sport_activity_level_id: r.sport_activity_level_id,
            town_id: r.town_id,
            role_id: None,
            phone_number: r.phone_number,
            email: r.email,
            password: r.password,
            is_have_injury: r.is_have_injury,
            injury_description: r.injury_description,
            photo: r.photo,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl From<LoginRequest> for domain::LoginRequest {
    fn from(r: LoginRequest) -> Self {
        domain::LoginRequest {
            email: r.email,
            password: r.password,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutRequest {
    pub user_id: i64,
    #[serde(default)]
    pub refresh_token: String,
}

impl From<LogoutRequest> for domain::LogoutRequest {
    fn from(r: LogoutRequest) -> Self {
        domain::LogoutRequest {
            user_id: r.user_id,
            refresh_token: r.refresh_token,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendOtpRequest {
    pub identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOtpResponse {
    pub otp_sent: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmOtpRequest {
    pub identifier: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmOtpResponse {
    pub otp_confirmed: bool,
    pub is_registered: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<OtpConfirmation> for ConfirmOtpResponse {
    fn from(c: OtpConfirmation) -> Self {
        let message = if c.registered {
            "OTP confirmed, user signed in"
        } else {
            "OTP confirmed, user not registered"
        };
        let (access_token, refresh_token) = match c.tokens {
            Some(pair) => (Some(pair.access_token), Some(pair.refresh_token)),
            None => (None, None),
        };
        Self {
            otp_confirmed: c.confirmed,
            is_registered: c.registered,
            message: message.to_string(),
            access_token,
            refresh_token,
        }
    }
}

/// The caller's own account, without credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
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

impl From<User> for ProfileResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            surname: u.surname,
            gender: u.gender,
            birth_date: u.birth_date,
            height_cm: u.height_cm,
            weight_kg: u.weight_kg,
            sport_activity_level_id: u.sport_activity_level_id,
            town_id: u.town_id,
            role_id: u.role_id,
            phone_number: u.phone_number,
            is_phone_verified: u.is_phone_verified,
            email: u.email,
            is_email_verified: u.is_email_verified,
            is_have_injury: u.is_have_injury,
            injury_description: u.injury_description,
            photo: u.photo,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeSessionsResponse {
    pub user_id: i64,
    pub revoked: u64,
}
