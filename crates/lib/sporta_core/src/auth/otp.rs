//! One-time passcodes: code generation and the delivery seam.

use async_trait::async_trait;
use rand::{Rng, rng};
use tracing::{debug, info};

use super::AuthError;

/// Number of digits in a generated code.
pub const OTP_DIGITS: usize = 4;

/// Delivers a freshly stored OTP code to its owner.
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, identifier: &str, code: &str) -> Result<(), AuthError>;
}

/// Sender that only records the dispatch in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOtpSender;

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, identifier: &str, code: &str) -> Result<(), AuthError> {
        info!(identifier, "OTP dispatched");
        debug!(identifier, code, "OTP code");
        Ok(())
    }
}

/// The configured fixed code, or [`OTP_DIGITS`] random decimal digits.
pub fn generate_code(fixed: Option<&str>) -> String {
    if let Some(code) = fixed.map(str::trim)
        && !code.is_empty()
    {
        return code.to_string();
    }
    let mut rng = rng();
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
