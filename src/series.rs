// Bucket timestamp -> request count, stored as JSON like
// {"1700000000":3,"1700000001":1}

use std::collections::BTreeMap;
use std::ops::RangeBounds;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a cached value could not be read back as a series.
#[derive(Debug, Error)]
pub enum SeriesDecodeError {
    #[error("malformed series data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("negative bucket timestamp {0}")]
    NegativeBucket(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries {
    buckets: BTreeMap<i64, u64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate `now` down to the start of its bucket.
    pub fn bucket_for(now: i64, bucket_seconds: u64) -> i64 {
        let size = i64::try_from(bucket_seconds.max(1)).unwrap_or(i64::MAX);
        now - now.rem_euclid(size)
    }

    pub fn add(&mut self, bucket: i64, count: u64) {
        let slot = self.buckets.entry(bucket).or_insert(0);
        *slot = slot.saturating_add(count);
    }

    pub fn get(&self, bucket: i64) -> Option<u64> {
        self.buckets.get(&bucket).copied()
    }

    pub fn first_bucket(&self) -> Option<i64> {
        self.buckets.first_key_value().map(|(bucket, _)| *bucket)
    }

    /// Drop every bucket older than `expired_time`.
    ///
    /// Only pays for a split when the oldest bucket is actually stale.
    /// Returns the number of buckets removed.
    pub fn prune_expired(&mut self, expired_time: i64) -> usize {
        match self.first_bucket() {
            Some(first) if first < expired_time => {
                let retained = self.buckets.split_off(&expired_time);
                let dropped = self.buckets.len();
                self.buckets = retained;
                dropped
            }
            _ => 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.buckets.iter().map(|(bucket, count)| (*bucket, *count))
    }

    /// Buckets whose timestamp falls in `range`, ascending.
    pub fn range<R>(&self, range: R) -> impl Iterator<Item = (i64, u64)> + '_
    where
        R: RangeBounds<i64>,
    {
        self.buckets
            .range(range)
            .map(|(bucket, count)| (*bucket, *count))
    }

    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a cached value, rejecting anything that breaks the series invariants.
    pub fn decode(raw: &str) -> Result<Self, SeriesDecodeError> {
        let series: TimeSeries = serde_json::from_str(raw)?;
        if let Some(first) = series.first_bucket() {
            if first < 0 {
                return Err(SeriesDecodeError::NegativeBucket(first));
            }
        }
        Ok(series)
    }
}

impl FromIterator<(i64, u64)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (i64, u64)>>(iter: I) -> Self {
        let mut series = TimeSeries::new();
        for (bucket, count) in iter {
            series.add(bucket, count);
        }
        series
    }
}
