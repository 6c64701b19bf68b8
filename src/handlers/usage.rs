use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::MonitorError;
use crate::monitored::UsageReport;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    // Key to report on; defaults to the proxy's monitoring key
    pub key: Option<String>,
    // Burst size the wait is computed for
    #[serde(default = "default_requests")]
    pub requests: u64,
}

fn default_requests() -> u64 {
    1
}

pub async fn usage_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageReport>, MonitorError> {
    let report = state
        .sender
        .usage_report(query.key.as_deref(), query.requests)
        .await?;
    Ok(Json(report))
}
