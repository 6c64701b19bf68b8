//! Error types for request monitoring.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the monitor.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Failures of the keyed cache backing the ledger.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The cache did not answer within the configured bound
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected or failed the operation
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Errors raised while recording or querying request usage.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The burst can never fit inside a single window
    #[error("cannot burst {requested} requests; window allocation is only {allocation}")]
    UnsatisfiableBurst { requested: u64, allocation: u64 },

    /// The cache holds something under the key that is not a time series
    #[error("cache entry for key '{key}' is not a valid time series: {reason}")]
    CorruptSeries { key: String, reason: String },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    #[error("failed to encode time series: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid monitor configuration: {0}")]
    InvalidConfig(String),
}

/// Error returned by a monitored send.
///
/// `Transport` carries the wrapped sender's error untouched. `Monitor` only
/// appears when the sender is configured to fail closed.
#[derive(Debug, Error)]
pub enum SendError<E> {
    #[error("request monitoring failed: {0}")]
    Monitor(#[source] MonitorError),

    #[error(transparent)]
    Transport(E),
}

impl<E> SendError<E> {
    /// The wrapped sender's error, if that is what failed.
    pub fn transport(&self) -> Option<&E> {
        match self {
            SendError::Transport(e) => Some(e),
            SendError::Monitor(_) => None,
        }
    }

    pub fn into_transport(self) -> Option<E> {
        match self {
            SendError::Transport(e) => Some(e),
            SendError::Monitor(_) => None,
        }
    }
}
