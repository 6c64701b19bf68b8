use clap::Parser; // for cli
use rate_monitor::cache::{MemoryCache, spawn_sweeper};
use rate_monitor::config::Args;
use rate_monitor::handlers::router;
use rate_monitor::ledger::TimeSeriesLedger;
use rate_monitor::monitor::RateMonitor;
use rate_monitor::monitored::MonitoredSender;
use rate_monitor::sender::HttpSender;
use rate_monitor::state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rate_monitor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();
    let config = args.monitor_config()?;

    let cache = Arc::new(MemoryCache::new());
    spawn_sweeper(cache.clone(), args.sweep_interval());

    let ledger = TimeSeriesLedger::new(cache)
        .with_key_prefix(args.key_prefix.clone())
        .with_cache_timeout(args.cache_timeout());

    let mut sender = MonitoredSender::new(
        HttpSender::new(reqwest::Client::new()),
        ledger,
        RateMonitor::new(config)?,
    )
    .with_failure_policy(args.failure_policy());

    match &args.monitor_key {
        Some(key) => sender = sender.with_key(key.clone()),
        None => tracing::warn!("No monitoring key set, forwarding unmonitored"),
    }

    let state = Arc::new(AppState::new(sender, args.upstream.clone()));
    let app = router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(port = args.port, "Rate monitor running");
    tracing::info!(upstream = %args.upstream, "Forwarding unmatched requests");
    tracing::info!(
        window_seconds = config.window_seconds,
        window_allocation = config.window_allocation,
        bucket_seconds = config.bucket_seconds,
        "Monitoring window"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
