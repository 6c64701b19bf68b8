//! Sender decorator that records each request against a key.
//!
//! A `MonitoredSender` never blocks or rejects traffic: it counts requests
//! in a rolling window and answers how much of the allocation is used and
//! how long a burst would have to wait. Throttling policy is left to the
//! caller.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::cache::KeyedCache;
use crate::clock::{Clock, SystemClock};
use crate::error::{MonitorResult, SendError};
use crate::ledger::TimeSeriesLedger;
use crate::metrics::{MONITOR_FAILURES, MONITORED_REQUESTS, SEND_LATENCY, UNMONITORED_REQUESTS};
use crate::monitor::RateMonitor;
use crate::sender::Sender;

/// What a send does when the monitoring step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and count the failure, then send unmonitored
    #[default]
    Open,
    /// Fail the send with [`SendError::Monitor`]
    Closed,
}

/// Point-in-time usage for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub key: Option<String>,
    pub used: u64,
    pub allocation: u64,
    pub available: u64,
    pub window_seconds: u64,
    /// Requests in the burst `wait_seconds` was computed for
    pub requests: u64,
    pub wait_seconds: u64,
}

pub struct MonitoredSender<S, C> {
    key: Option<String>,
    inner: Arc<S>,
    ledger: Arc<TimeSeriesLedger<C>>,
    monitor: Arc<RateMonitor>,
    clock: Arc<dyn Clock>,
    policy: FailurePolicy,
}

impl<S, C> Clone for MonitoredSender<S, C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            inner: Arc::clone(&self.inner),
            ledger: Arc::clone(&self.ledger),
            monitor: Arc::clone(&self.monitor),
            clock: Arc::clone(&self.clock),
            policy: self.policy,
        }
    }
}

impl<S, C> MonitoredSender<S, C>
where
    S: Sender,
    C: KeyedCache + Sync,
{
    pub fn new(inner: S, ledger: TimeSeriesLedger<C>, monitor: RateMonitor) -> Self {
        Self::from_shared(Arc::new(inner), Arc::new(ledger), Arc::new(monitor))
    }

    /// Build over parts that are already shared with other decorators.
    pub fn from_shared(
        inner: Arc<S>,
        ledger: Arc<TimeSeriesLedger<C>>,
        monitor: Arc<RateMonitor>,
    ) -> Self {
        Self {
            key: None,
            inner,
            ledger,
            monitor,
            clock: Arc::new(SystemClock),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// A copy of this sender that records against `key`.
    ///
    /// The wrapped sender, ledger and clock stay shared; `self` is untouched.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.key = Some(key.into());
        next
    }

    pub fn without_key(&self) -> Self {
        let mut next = self.clone();
        next.key = None;
        next
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn ledger(&self) -> &TimeSeriesLedger<C> {
        &self.ledger
    }

    pub fn monitor(&self) -> &RateMonitor {
        &self.monitor
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Rebuild the wrapped sender through `f` and keep monitoring around the
    /// result, so fluent reconfiguration of the inner sender stays wrapped.
    pub fn map_inner<T, F>(&self, f: F) -> MonitoredSender<T, C>
    where
        T: Sender,
        F: FnOnce(&S) -> T,
    {
        MonitoredSender {
            key: self.key.clone(),
            inner: Arc::new(f(&self.inner)),
            ledger: Arc::clone(&self.ledger),
            monitor: Arc::clone(&self.monitor),
            clock: Arc::clone(&self.clock),
            policy: self.policy,
        }
    }

    /// Requests recorded in the current window for `key`, or for this
    /// sender's key when `key` is `None`. No key at all reports 0.
    pub async fn usage_for(&self, key: Option<&str>) -> MonitorResult<u64> {
        let Some(key) = self.resolve_key(key) else {
            return Ok(0);
        };
        let series = self.ledger.load(key).await?;
        Ok(self.monitor.allocation_used(&series, self.clock.now()))
    }

    /// Seconds before `request_count` requests can be sent back to back
    /// without exceeding the allocation. Key resolution as in
    /// [`usage_for`](Self::usage_for).
    pub async fn wait_seconds_for(&self, key: Option<&str>, request_count: u64) -> MonitorResult<u64> {
        let Some(key) = self.resolve_key(key) else {
            return Ok(0);
        };
        let series = self.ledger.load(key).await?;
        self.monitor
            .wait_seconds(&series, self.clock.now(), request_count)
    }

    /// Used, available and wait figures from a single series read.
    pub async fn usage_report(
        &self,
        key: Option<&str>,
        request_count: u64,
    ) -> MonitorResult<UsageReport> {
        let config = self.monitor.config();
        let Some(key) = self.resolve_key(key) else {
            return Ok(UsageReport {
                key: None,
                used: 0,
                allocation: config.window_allocation,
                available: config.window_allocation,
                window_seconds: config.window_seconds,
                requests: request_count,
                wait_seconds: 0,
            });
        };

        let series = self.ledger.load(key).await?;
        let now = self.clock.now();
        let used = self.monitor.allocation_used(&series, now);
        Ok(UsageReport {
            key: Some(key.to_string()),
            used,
            allocation: config.window_allocation,
            available: config.window_allocation.saturating_sub(used),
            window_seconds: config.window_seconds,
            requests: request_count,
            wait_seconds: self.monitor.wait_seconds(&series, now, request_count)?,
        })
    }

    fn resolve_key<'a>(&'a self, key: Option<&'a str>) -> Option<&'a str> {
        key.or(self.key.as_deref()).filter(|k| !k.is_empty())
    }

    // Err only when the failure policy forbids sending
    async fn record(&self, key: &str) -> Result<(), SendError<S::Error>> {
        let now = self.clock.now();
        match self.ledger.append(key, now, self.monitor.config(), 1).await {
            Ok(series) => {
                MONITORED_REQUESTS.inc();
                tracing::debug!(
                    key,
                    used = self.monitor.allocation_used(&series, now),
                    allocation = self.monitor.window_allocation(),
                    "Recorded request"
                );
                Ok(())
            }
            Err(e) => {
                MONITOR_FAILURES.inc();
                match self.policy {
                    FailurePolicy::Open => {
                        tracing::warn!(key, error = %e, "Request monitoring failed, sending unmonitored");
                        Ok(())
                    }
                    FailurePolicy::Closed => {
                        tracing::warn!(key, error = %e, "Request monitoring failed, refusing to send");
                        Err(SendError::Monitor(e))
                    }
                }
            }
        }
    }
}

impl<S, C> Sender for MonitoredSender<S, C>
where
    S: Sender,
    C: KeyedCache + Sync,
{
    type Request = S::Request;
    type Response = S::Response;
    type Error = SendError<S::Error>;

    /// Record the request against the current key, then hand it to the
    /// wrapped sender. Without a key the request is sent unmonitored.
    async fn send(&self, request: S::Request) -> Result<S::Response, SendError<S::Error>> {
        match self.resolve_key(None) {
            Some(key) => self.record(key).await?,
            None => UNMONITORED_REQUESTS.inc(),
        }

        let start_time = Instant::now();
        let result = self.inner.send(request).await.map_err(SendError::Transport);
        SEND_LATENCY.observe(start_time.elapsed().as_secs_f64());

        result
    }
}
