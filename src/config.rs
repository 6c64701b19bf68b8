use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};
use crate::monitored::FailurePolicy;

/// Rolling window parameters for one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Length of the trailing window
    pub window_seconds: u64,
    /// Requests allowed inside one window
    pub window_allocation: u64,
    /// Resolution requests are grouped at in the stored series
    pub bucket_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            window_allocation: 60,
            bucket_seconds: 1,
        }
    }
}

impl MonitorConfig {
    pub fn new(window_seconds: u64, window_allocation: u64, bucket_seconds: u64) -> Self {
        Self {
            window_seconds,
            window_allocation,
            bucket_seconds,
        }
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.window_seconds == 0 {
            return Err(MonitorError::InvalidConfig(
                "window_seconds must be at least 1".to_string(),
            ));
        }
        if i64::try_from(self.window_seconds).is_err() {
            return Err(MonitorError::InvalidConfig(format!(
                "window_seconds {} is out of range",
                self.window_seconds
            )));
        }
        if self.bucket_seconds == 0 {
            return Err(MonitorError::InvalidConfig(
                "bucket_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Window length as a signed offset for timestamp arithmetic.
    pub fn window_offset(&self) -> i64 {
        i64::try_from(self.window_seconds).unwrap_or(i64::MAX)
    }

    /// Cache expiry for a series entry.
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "rate-monitor")]
#[command(about = "Forwarding proxy that monitors request rate over a rolling window")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Upstream every unmatched request is forwarded to
    #[arg(short, long, default_value = "http://localhost:9000")]
    pub upstream: String,

    // Key forwarded requests are counted under; unset sends unmonitored
    #[arg(short = 'k', long)]
    pub monitor_key: Option<String>,

    // Rolling window length in seconds
    #[arg(long, default_value_t = 60)]
    pub window_seconds: u64,

    // Requests allowed per window
    #[arg(long, default_value_t = 60)]
    pub window_allocation: u64,

    // Bucket resolution in seconds
    #[arg(long, default_value_t = 1)]
    pub bucket_seconds: u64,

    // Namespace for monitor entries in the cache
    #[arg(long, default_value = crate::ledger::DEFAULT_KEY_PREFIX)]
    pub key_prefix: String,

    // Bound on each cache round trip, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub cache_timeout_ms: u64,

    // Expired cache entry sweep interval in seconds
    #[arg(long, default_value_t = 30)]
    pub sweep_interval: u64,

    // Fail requests when monitoring fails instead of sending unmonitored
    #[arg(long)]
    pub fail_closed: bool,
}

impl Args {
    pub fn monitor_config(&self) -> MonitorResult<MonitorConfig> {
        let config = MonitorConfig::new(
            self.window_seconds,
            self.window_allocation,
            self.bucket_seconds,
        );
        config.validate()?;
        Ok(config)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        if self.fail_closed {
            FailurePolicy::Closed
        } else {
            FailurePolicy::Open
        }
    }
}
