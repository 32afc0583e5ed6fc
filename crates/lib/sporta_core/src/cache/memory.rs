//! In-memory ephemeral cache with lazy expiry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{CacheError, EphemeralCache};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Mutex-guarded map. Expired entries are dropped when next touched.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Live entry for `key`, evicting it first if it has expired.
    fn live(entries: &mut HashMap<String, Entry>, key: &str) -> Option<Entry> {
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

fn ensure_live(ctx: &CancellationToken) -> Result<(), CacheError> {
    if ctx.is_cancelled() {
        Err(CacheError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl EphemeralCache for MemoryCache {
    async fn set(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        ensure_live(ctx)?;
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, ctx: &CancellationToken, key: &str) -> Result<Option<String>, CacheError> {
        ensure_live(ctx)?;
        Ok(Self::live(&mut self.lock(), key).map(|e| e.value))
    }

    async fn delete(&self, ctx: &CancellationToken, key: &str) -> Result<bool, CacheError> {
        ensure_live(ctx)?;
        let mut entries = self.lock();
        let existed = Self::live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn ttl(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> Result<Option<Duration>, CacheError> {
        ensure_live(ctx)?;
        let now = Instant::now();
        Ok(Self::live(&mut self.lock(), key)
            .map(|e| e.expires_at.saturating_duration_since(now))
            .filter(|d| !d.is_zero()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MemoryCache::new();
        let ctx = CancellationToken::new();
        cache
            .set(&ctx, "k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(&ctx, "k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.delete(&ctx, "k").await.unwrap());
        assert!(cache.get(&ctx, "k").await.unwrap().is_none());
        assert!(!cache.delete(&ctx, "k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        let ctx = CancellationToken::new();
        cache
            .set(&ctx, "k", "v", Duration::from_secs(5))
            .await
            .unwrap();

        let ttl = cache.ttl(&ctx, "k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(5) && ttl > Duration::from_secs(4));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get(&ctx, "k").await.unwrap().is_none());
        assert!(cache.ttl(&ctx, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_overwrites_value_and_ttl() {
        let cache = MemoryCache::new();
        let ctx = CancellationToken::new();
        cache
            .set(&ctx, "k", "old", Duration::from_secs(5))
            .await
            .unwrap();
        cache
            .set(&ctx, "k", "new", Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(cache.get(&ctx, "k").await.unwrap().as_deref(), Some("new"));
        assert!(cache.ttl(&ctx, "k").await.unwrap().unwrap() > Duration::from_secs(500));
    }

    #[tokio::test]
    async fn cancelled_context_fails_fast() {
        let cache = MemoryCache::new();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = cache.get(&ctx, "k").await.unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
    }
}
