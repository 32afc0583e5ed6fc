//! Redis-backed ephemeral cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;

use super::{CacheError, EphemeralCache, cancellable};

/// Cache on a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a connection manager for `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl EphemeralCache for RedisCache {
    async fn set(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        // PSETEX rejects a zero expiry.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        cancellable(ctx, async move {
            conn.pset_ex::<_, _, ()>(key, value, millis).await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, ctx: &CancellationToken, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        cancellable(ctx, async move {
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn delete(&self, ctx: &CancellationToken, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        cancellable(ctx, async move {
            let removed: i64 = conn.del(key).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn ttl(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn.clone();
        cancellable(ctx, async move {
            // -2: no such key, -1: no expiry.
            let millis: i64 = conn.pttl(key).await?;
            Ok(u64::try_from(millis)
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis))
        })
        .await
    }
}
