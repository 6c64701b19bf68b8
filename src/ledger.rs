// Cache-backed storage of per-key time series. Writers to one key go through
// a per-key lock; readers never lock and see the old or the new series.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::cache::KeyedCache;
use crate::config::MonitorConfig;
use crate::error::{CacheError, MonitorError, MonitorResult};
use crate::series::TimeSeries;

pub const DEFAULT_KEY_PREFIX: &str = "rate-monitor";
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TimeSeriesLedger<C> {
    cache: Arc<C>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    key_prefix: String,
    cache_timeout: Duration,
}

impl<C> TimeSeriesLedger<C>
where
    C: KeyedCache + Sync,
{
    pub fn new(cache: Arc<C>) -> Self {
        Self {
            cache,
            locks: DashMap::new(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    /// Namespace for entries in a shared cache. Empty stores keys as given.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Cache key the series for `key` lives under.
    pub fn entry_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    /// Read the series for `key`. An absent entry is an empty series.
    pub async fn load(&self, key: &str) -> MonitorResult<TimeSeries> {
        let entry_key = self.entry_key(key);
        let Some(raw) = self.bounded(self.cache.get(&entry_key)).await? else {
            return Ok(TimeSeries::new());
        };

        TimeSeries::decode(&raw).map_err(|e| {
            tracing::warn!(key = %entry_key, error = %e, "Cache entry is not a time series");
            MonitorError::CorruptSeries {
                key: entry_key,
                reason: e.to_string(),
            }
        })
    }

    /// Load the series and add `count` requests to the bucket holding `now`.
    ///
    /// Nothing is written; pass the result to [`commit`](Self::commit).
    pub async fn record(
        &self,
        key: &str,
        now: i64,
        bucket_seconds: u64,
        count: u64,
    ) -> MonitorResult<TimeSeries> {
        let mut series = self.load(key).await?;
        series.add(TimeSeries::bucket_for(now, bucket_seconds), count);
        Ok(series)
    }

    /// Prune buckets older than `now - window_seconds` and store the series
    /// with a full window of expiry. Returns what was stored.
    pub async fn commit(
        &self,
        key: &str,
        mut series: TimeSeries,
        window_seconds: u64,
        now: i64,
    ) -> MonitorResult<TimeSeries> {
        let window = i64::try_from(window_seconds).unwrap_or(i64::MAX);
        let pruned = series.prune_expired(now.saturating_sub(window));
        if pruned > 0 {
            tracing::trace!(key, pruned, "Pruned expired buckets");
        }

        let entry_key = self.entry_key(key);
        let encoded = series.encode()?;
        let ttl = Duration::from_secs(window_seconds);
        self.bounded(self.cache.set_with_ttl(&entry_key, encoded, ttl))
            .await?;

        Ok(series)
    }

    /// Record and commit `count` requests as one step, exclusive per key.
    ///
    /// Waiting for the key's lock counts against `cache_timeout` together
    /// with the cache round trips.
    pub async fn append(
        &self,
        key: &str,
        now: i64,
        config: &MonitorConfig,
        count: u64,
    ) -> MonitorResult<TimeSeries> {
        // declared before the lock handle so it drops after it, also when
        // the caller abandons this future
        let _release = LockRelease {
            locks: &self.locks,
            key,
        };
        let lock = self.lock_for(key);

        self.bounded(self.append_locked(&lock, key, now, config, count))
            .await
    }

    async fn append_locked(
        &self,
        lock: &Mutex<()>,
        key: &str,
        now: i64,
        config: &MonitorConfig,
        count: u64,
    ) -> MonitorResult<TimeSeries> {
        let _guard = lock.lock().await;
        let series = self.record(key, now, config.bucket_seconds, count).await?;
        self.commit(key, series, config.window_seconds, now).await
    }

    /// Number of keys with a writer in flight.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn bounded<T, E, F>(&self, op: F) -> MonitorResult<T>
    where
        F: Future<Output = Result<T, E>>,
        MonitorError: From<E>,
    {
        match tokio::time::timeout(self.cache_timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout(self.cache_timeout).into()),
        }
    }
}

// Forgets the key's lock once only the table still holds it
struct LockRelease<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
}

impl Drop for LockRelease<'_> {
    fn drop(&mut self) {
        self.locks
            .remove_if(self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
