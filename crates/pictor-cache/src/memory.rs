use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::traits::{Cache, CacheError, CacheResult};

#[derive(Debug, Clone)]
struct CachedEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache.
///
/// `get` drops the expired entry it finds; `purge_expired` sweeps the rest.
/// Expiry is checked against `tokio::time::Instant`, so paused-clock tests
/// can step over a TTL without sleeping.
#[derive(Debug, Default)]
pub struct MemoryCache {
    store: RwLock<HashMap<String, CachedEntry>>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("cache unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_available()?;
        let now = Instant::now();
        {
            let store = self.store.read().await;
            match store.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut store = self.store.write().await;
        // A concurrent `set` may have refreshed the entry since the read.
        if store.get(key).is_some_and(|entry| entry.expires_at <= now) {
            store.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.check_available()?;
        let entry = CachedEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.store.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check_available()?;
        self.store.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        self.check_available()?;
        let mut store = self.store.write().await;
        let now = Instant::now();
        let before = store.len();
        store.retain(|_, entry| entry.expires_at > now);
        Ok((before - store.len()) as u64)
    }
}
