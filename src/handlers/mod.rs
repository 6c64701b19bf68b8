mod forward;
mod health;
mod metrics;
mod usage;

pub use forward::{ForwardError, MAX_BODY_BYTES, forward_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use usage::{UsageQuery, usage_handler};

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::MonitorError;
use crate::state::AppState;

impl MonitorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MonitorError::UnsatisfiableBurst { .. } => StatusCode::BAD_REQUEST,
            MonitorError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MonitorError::CorruptSeries { .. }
            | MonitorError::Encode(_)
            | MonitorError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Usage query failed");
        }
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

// Routes served by the proxy; everything else is forwarded upstream
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/usage", get(usage_handler))
        .fallback(forward_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
