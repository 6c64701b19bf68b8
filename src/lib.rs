//! Request rate monitoring over a rolling window.
//!
//! [`MonitoredSender`] decorates any [`Sender`], recording each request
//! against a key in a [`TimeSeriesLedger`] kept in a [`KeyedCache`], and
//! answers how much of the window allocation is used and how long a burst
//! of requests must wait. It observes traffic; it never throttles it.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod monitor;
pub mod monitored;
pub mod sender;
pub mod series;
pub mod state;

pub use cache::{KeyedCache, LocalKeyedCache, MemoryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MonitorConfig;
pub use error::{CacheError, MonitorError, MonitorResult, SendError};
pub use ledger::TimeSeriesLedger;
pub use monitor::RateMonitor;
pub use monitored::{FailurePolicy, MonitoredSender, UsageReport};
pub use sender::{HttpSender, Sender};
pub use series::TimeSeries;
