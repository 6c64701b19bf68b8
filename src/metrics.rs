use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref MONITORED_REQUESTS: Counter =
        register_counter!("rate_monitor_requests_monitored_total", "Requests recorded against a key").unwrap();
    pub static ref UNMONITORED_REQUESTS: Counter =
        register_counter!("rate_monitor_requests_unmonitored_total", "Requests sent without a monitoring key").unwrap();
    pub static ref MONITOR_FAILURES: Counter =
        register_counter!("rate_monitor_failures_total", "Requests whose monitoring step failed").unwrap();
    pub static ref SEND_LATENCY: Histogram = register_histogram!(
        "rate_monitor_send_latency_seconds",
        "Latency of the wrapped sender in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("rate_monitor_cache_size", "Current number of entries in the in-process cache").unwrap();
}
