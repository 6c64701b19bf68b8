use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::error::CacheError;
use crate::metrics::CACHE_SIZE;

/// Expiring key-value store the ledger keeps its series in.
#[trait_variant::make(KeyedCache: Send)]
pub trait LocalKeyedCache {
    /// Current value for `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`, clearing any expiry previously set on the key
    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Store `value` expiring after `ttl` as one write: the value never
    /// lands without its deadline (`SET key value EX ttl` on Redis)
    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Expire `key` after `ttl`. A missing key is not an error.
    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;
}

// Cache entry with timestamp
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: String,
    pub created_at: Instant,
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    pub fn new(value: String) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            expires_at: None,
        }
    }

    pub fn expiring(value: String, ttl: Duration) -> Self {
        let created_at = Instant::now();
        Self {
            value,
            created_at,
            expires_at: Some(created_at + ttl),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-process cache. Expired entries disappear on read and on each sweep.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // drop an entry outright, as eviction would
    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

impl KeyedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), CacheEntry::new(value));
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), CacheEntry::expiring(value, ttl));
        Ok(())
    }

    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

// Sweeper - purges expired entries on an interval so idle keys free memory
pub fn spawn_sweeper(cache: Arc<MemoryCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        tracing::info!(interval = ?every, "Cache sweeper started");

        loop {
            ticker.tick().await;

            let purged = cache.purge_expired();
            CACHE_SIZE.set(cache.len() as f64);
            if purged > 0 {
                tracing::debug!(purged, remaining = cache.len(), "Purged expired cache entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{KeyedCache, MemoryCache, spawn_sweeper};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_set_roundtrip() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("a").await.unwrap(), None);

        cache.set("a", "one".to_string()).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("one"));

        cache.set("a", "two".to_string()).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("two"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_gone_on_read() {
        let cache = MemoryCache::new();
        cache.set("a", "one".to_string()).await.unwrap();
        cache.expire_after("a", Duration::ZERO).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_set_clears_previous_expiry() {
        let cache = MemoryCache::new();
        cache.set("a", "one".to_string()).await.unwrap();
        cache.expire_after("a", Duration::ZERO).await.unwrap();
        cache.set("a", "two".to_string()).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_set_with_ttl_writes_value_and_deadline_together() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("a", "one".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("one"));

        // replaces both the value and the old deadline
        cache
            .set_with_ttl("a", "two".to_string(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expire_missing_key_is_ok() {
        let cache = MemoryCache::new();
        assert!(cache.expire_after("nope", Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("stale", "x".to_string()).await.unwrap();
        cache.set("fresh", "y".to_string()).await.unwrap();
        cache.expire_after("stale", Duration::ZERO).await.unwrap();
        cache.expire_after("fresh", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remove("fresh").as_deref(), Some("y"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_in_background() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("stale", "x".to_string()).await.unwrap();
        cache.expire_after("stale", Duration::ZERO).await.unwrap();

        let handle = spawn_sweeper(cache.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(cache.is_empty());
        handle.abort();
    }
}
