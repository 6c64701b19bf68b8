use std::ops::Bound;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::series::TimeSeries;

#[derive(Debug, Clone)]
pub struct RateMonitor {
    config: MonitorConfig,
}

impl RateMonitor {
    pub fn new(config: MonitorConfig) -> MonitorResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn window_allocation(&self) -> u64 {
        self.config.window_allocation
    }

    /// Buckets at or before this time no longer count against the allocation.
    pub fn expired_time(&self, now: i64) -> i64 {
        now.saturating_sub(self.config.window_offset())
    }

    /// Requests recorded in `(now - window, now]`.
    ///
    /// Buckets later than `now` (clock skew between writers) are ignored.
    pub fn allocation_used(&self, series: &TimeSeries, now: i64) -> u64 {
        let expired = self.expired_time(now);
        series
            .range((Bound::Excluded(expired), Bound::Included(now)))
            .map(|(_, count)| count)
            .sum()
    }

    pub fn allocation_available(&self, series: &TimeSeries, now: i64) -> u64 {
        self.config
            .window_allocation
            .saturating_sub(self.allocation_used(series, now))
    }

    /// Seconds until a burst of `request_count` requests fits in the window.
    ///
    /// Finds the earliest bucket whose running total covers the shortfall;
    /// the wait ends when that bucket slides out of the window.
    pub fn wait_seconds(
        &self,
        series: &TimeSeries,
        now: i64,
        request_count: u64,
    ) -> MonitorResult<u64> {
        let allocation = self.config.window_allocation;
        let used = self.allocation_used(series, now);
        let available = allocation.saturating_sub(used);

        if available >= request_count {
            return Ok(0);
        }

        if request_count > allocation {
            return Err(MonitorError::UnsatisfiableBurst {
                requested: request_count,
                allocation,
            });
        }

        // used may already exceed the allocation, so count from used
        // rather than from the (saturated) available figure
        let to_free_up = used.saturating_add(request_count) - allocation;
        let expired = self.expired_time(now);

        // Same buckets allocation_used counts: one sitting exactly on the
        // window edge has already freed its share.
        let mut freed = 0u64;
        for (bucket, count) in series.range((Bound::Excluded(expired), Bound::Included(now))) {
            freed = freed.saturating_add(count);
            if freed >= to_free_up {
                let frees_at = bucket.saturating_add(self.config.window_offset());
                return Ok(u64::try_from(frees_at - now).unwrap_or(0));
            }
        }

        Ok(0)
    }
}
