//! Authentication configuration.
//!
//! An immutable value passed into [`crate::auth::session::SessionService`]
//! and [`crate::auth::jwt::TokenIssuer`] at construction time. Nothing in the
//! core reads the environment; see `sporta_api::config` for that.

use std::time::Duration;

/// Access token lifetime default: 10 minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Refresh token lifetime default: 30 days.
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How long revoked/expired refresh token rows are kept before purging.
pub const DEFAULT_REFRESH_TOKEN_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// OTP challenge lifetime: 5 minutes.
pub const OTP_TTL: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_ACCESS_TOKEN_KEY_TEMPLATE: &str = "access_token:{}";
pub const DEFAULT_OTP_KEY_TEMPLATE: &str = "otp:{}";

/// Day-month-year, e.g. `31-12-1999`.
pub const DEFAULT_BIRTH_DATE_FORMAT: &str = "%d-%m-%Y";

/// Secrets, lifetimes and key layout for token and OTP handling.
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 secret for access tokens.
    pub access_token_secret: String,
    pub access_token_ttl: Duration,
    /// HS256 secret for refresh tokens. Must differ from the access secret.
    pub refresh_token_secret: String,
    pub refresh_token_ttl: Duration,
    /// Cache key template for liveness markers; `{}` is replaced by the user ID.
    pub access_token_key_template: String,
    /// Cache key template for OTP challenges; `{}` is replaced by the identifier.
    pub otp_key_template: String,
    /// `chrono` format string for the registration birth date.
    pub birth_date_format: String,
    /// When set, every OTP challenge uses this code instead of a random one.
    pub otp_fixed_code: Option<String>,
    pub refresh_token_retention: Duration,
}

impl AuthConfig {
    /// Build a config with the given secrets and defaults for everything else.
    pub fn new(
        access_token_secret: impl Into<String>,
        refresh_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            access_token_secret: access_token_secret.into(),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_secret: refresh_token_secret.into(),
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            access_token_key_template: DEFAULT_ACCESS_TOKEN_KEY_TEMPLATE.to_string(),
            otp_key_template: DEFAULT_OTP_KEY_TEMPLATE.to_string(),
            birth_date_format: DEFAULT_BIRTH_DATE_FORMAT.to_string(),
            otp_fixed_code: None,
            refresh_token_retention: DEFAULT_REFRESH_TOKEN_RETENTION,
        }
    }

    /// Cache key of the access-token liveness marker for `user_id`.
    pub fn access_token_key(&self, user_id: i64) -> String {
        self.access_token_key_template
            .replace("{}", &user_id.to_string())
    }

    /// Cache key of the OTP challenge for an already-normalized identifier.
    pub fn otp_key(&self, identifier: &str) -> String {
        self.otp_key_template.replace("{}", identifier)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_secret", &"<redacted>")
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("access_token_key_template", &self.access_token_key_template)
            .field("otp_key_template", &self.otp_key_template)
            .field("birth_date_format", &self.birth_date_format)
            .field("otp_fixed_code", &self.otp_fixed_code.as_ref().map(|_| "<set>"))
            .field("refresh_token_retention", &self.refresh_token_retention)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_templates() {
        let config = AuthConfig::new("a", "r");
        assert_eq!(config.access_token_key(42), "access_token:42");
        assert_eq!(config.otp_key("+79990001122"), "otp:+79990001122");
    }

    #[test]
    fn custom_templates_are_respected() {
        let mut config = AuthConfig::new("a", "r");
        config.access_token_key_template = "auth:access_token:{}".into();
        config.otp_key_template = "auth:otp:code:{}".into();
        assert_eq!(config.access_token_key(7), "auth:access_token:7");
        assert_eq!(config.otp_key("x"), "auth:otp:code:x");
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AuthConfig::new("super-secret-access", "super-secret-refresh");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
