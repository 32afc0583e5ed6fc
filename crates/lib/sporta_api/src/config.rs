//! API server configuration.

use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sporta_core::config::AuthConfig;
use thiserror::Error;
use tracing::warn;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: expected a whole number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },

    #[error("{var} must contain a `{{}}` placeholder")]
    MissingPlaceholder { var: &'static str },

    #[error("access and refresh token secrets must differ")]
    SharedSecret,
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// Token, OTP and key layout settings handed to the session service.
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                         | Default                               |
    /// |----------------------------------|---------------------------------------|
    /// | `BIND_ADDR`                      | `127.0.0.1:3100`                      |
    /// | `DATABASE_URL`                   | `postgres://localhost:5432/sporta`    |
    /// | `REDIS_URL`                      | `redis://127.0.0.1:6379`              |
    /// | `ACCESS_TOKEN_SECRET`            | random per process (warns)            |
    /// | `REFRESH_TOKEN_SECRET`           | random per process (warns)            |
    /// | `ACCESS_TOKEN_TTL_SECS`          | `600`                                 |
    /// | `REFRESH_TOKEN_TTL_SECS`         | `2592000`                             |
    /// | `ACCESS_TOKEN_KEY_TEMPLATE`      | `access_token:{}`                     |
    /// | `OTP_KEY_TEMPLATE`               | `otp:{}`                              |
    /// | `BIRTH_DATE_FORMAT`              | `%d-%m-%Y`                            |
    /// | `OTP_FIXED_CODE`                 | unset (random codes)                  |
    /// | `REFRESH_TOKEN_RETENTION_SECS`   | `2592000`                             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ApiConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let access_secret = get("ACCESS_TOKEN_SECRET")
            .unwrap_or_else(|| generated_secret("ACCESS_TOKEN_SECRET"));
        let refresh_secret = get("REFRESH_TOKEN_SECRET")
            .unwrap_or_else(|| generated_secret("REFRESH_TOKEN_SECRET"));
        if access_secret == refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        let mut auth = AuthConfig::new(access_secret, refresh_secret);
        if let Some(ttl) = seconds(&get, "ACCESS_TOKEN_TTL_SECS")? {
            auth.access_token_ttl = ttl;
        }
        if let Some(ttl) = seconds(&get, "REFRESH_TOKEN_TTL_SECS")? {
            auth.refresh_token_ttl = ttl;
        }
        if let Some(window) = seconds(&get, "REFRESH_TOKEN_RETENTION_SECS")? {
            auth.refresh_token_retention = window;
        }
        if let Some(template) = get("ACCESS_TOKEN_KEY_TEMPLATE") {
            auth.access_token_key_template =
                template_with_placeholder("ACCESS_TOKEN_KEY_TEMPLATE", template)?;
        }
        if let Some(template) = get("OTP_KEY_TEMPLATE") {
            auth.otp_key_template = template_with_placeholder("OTP_KEY_TEMPLATE", template)?;
        }
        if let Some(format) = get("BIRTH_DATE_FORMAT") {
            auth.birth_date_format = format;
        }
        auth.otp_fixed_code = get("OTP_FIXED_CODE");
        if auth.otp_fixed_code.is_some() {
            warn!("OTP_FIXED_CODE is set; every OTP challenge uses the same code");
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3100".into()),
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/sporta".into()),
            redis_url: get("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            auth,
        })
    }
}

fn seconds<G>(get: &G, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidSeconds { var, value })
        })
        .transpose()
}

fn template_with_placeholder(var: &'static str, template: String) -> Result<String, ConfigError> {
    if template.contains("{}") {
        Ok(template)
    } else {
        Err(ConfigError::MissingPlaceholder { var })
    }
}

/// Random 64-character secret for a variable that was left unset.
///
/// Tokens signed with it do not survive a restart.
fn generated_secret(var: &str) -> String {
    warn!(var, "secret not configured, using a random per-process secret");
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}
