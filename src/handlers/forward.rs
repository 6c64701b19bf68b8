use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use thiserror::Error;

use crate::error::SendError;
use crate::sender::Sender;
use crate::state::AppState;

// Largest request body the proxy buffers before forwarding; larger bodies
// are turned away with 413 before anything is recorded
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build upstream request: {0}")]
    Build(reqwest::Error),

    #[error(transparent)]
    Send(#[from] SendError<reqwest::Error>),

    #[error("failed to read upstream response: {0}")]
    Upstream(reqwest::Error),
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = match &self {
            ForwardError::Build(_) => StatusCode::BAD_REQUEST,
            ForwardError::Send(SendError::Monitor(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ForwardError::Send(SendError::Transport(e)) if e.is_timeout() => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ForwardError::Send(SendError::Transport(_)) | ForwardError::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        tracing::warn!(error = %self, status = %status, "Forwarding failed");
        (status, self.to_string()).into_response()
    }
}

// Forward any unmatched request to the upstream through the monitored sender
pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ForwardError> {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = format!("{}{}", state.upstream, path);

    headers.remove(header::HOST);

    let outbound = state
        .client
        .request(method, url)
        .headers(headers)
        .body(body)
        .build()
        .map_err(ForwardError::Build)?;

    let upstream = state.sender.send(outbound).await?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    // Body is re-framed by the server
    response_headers.remove(header::TRANSFER_ENCODING);
    response_headers.remove(header::CONTENT_LENGTH);
    let bytes = upstream.bytes().await.map_err(ForwardError::Upstream)?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}
