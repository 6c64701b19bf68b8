use crate::cache::MemoryCache;
use crate::monitored::MonitoredSender;
use crate::sender::HttpSender;
// app's shared state

pub type ProxySender = MonitoredSender<HttpSender, MemoryCache>;

pub struct AppState {
    pub client: reqwest::Client,
    pub sender: ProxySender,  // monitored path to the upstream
    pub upstream: String,     // base url requests are forwarded to
}

impl AppState {
    pub fn new(sender: ProxySender, upstream: impl Into<String>) -> Self {
        Self {
            client: sender.inner().client().clone(),
            sender,
            upstream: upstream.into().trim_end_matches('/').to_string(),
        }
    }
}
