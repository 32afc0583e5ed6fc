//! Ephemeral TTL cache: access-token liveness markers and OTP challenges.
//!
//! [`redis::RedisCache`] is the production backend;
//! [`memory::MemoryCache`] serves tests and local runs.

pub mod memory;
pub mod redis;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Ephemeral cache errors. A missing key is `Ok(None)`, never an error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// String key/value cache where every entry carries a TTL.
#[async_trait]
pub trait EphemeralCache: Send + Sync {
    /// Store `value` under `key`, replacing any previous entry.
    async fn set(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn get(&self, ctx: &CancellationToken, key: &str) -> Result<Option<String>, CacheError>;

    /// Remove `key`. Returns whether an entry existed.
    async fn delete(&self, ctx: &CancellationToken, key: &str) -> Result<bool, CacheError>;

    /// Remaining lifetime of `key`; `None` when absent or without a positive TTL.
    async fn ttl(&self, ctx: &CancellationToken, key: &str)
    -> Result<Option<Duration>, CacheError>;
}

/// Run a cache call under the caller's cancellation token.
pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, call: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    if ctx.is_cancelled() {
        return Err(CacheError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(CacheError::Cancelled),
        result = call => result,
    }
}
