use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use rate_monitor::handlers::{MAX_BODY_BYTES, router};
use rate_monitor::state::AppState;
use rate_monitor::{
    HttpSender, KeyedCache, ManualClock, MemoryCache, MonitorConfig, MonitoredSender, RateMonitor,
    TimeSeries, TimeSeriesLedger,
};
use tower::ServiceExt;

async fn app_with_history(history: &[(i64, u64)], clock_at: i64) -> axum::Router {
    let cache = Arc::new(MemoryCache::new());
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let sender = MonitoredSender::new(
        HttpSender::new(client),
        TimeSeriesLedger::new(cache.clone()),
        RateMonitor::new(MonitorConfig::new(10, 3, 1)).unwrap(),
    )
    .with_clock(Arc::new(ManualClock::new(clock_at)))
    .with_key("upstream");

    let series: TimeSeries = history.iter().copied().collect();
    cache
        .set("rate-monitor:upstream", series.encode().unwrap())
        .await
        .unwrap();

    let state = Arc::new(AppState::new(sender, "http://127.0.0.1:9/"));
    router(state)
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let app = app_with_history(&[], 0).await;
    let (status, body) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_usage_for_default_key() {
    let app = app_with_history(&[(0, 1), (5, 1)], 5).await;
    let (status, body) = get_json(app, "/usage?requests=2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "upstream");
    assert_eq!(body["used"], 2);
    assert_eq!(body["available"], 1);
    assert_eq!(body["allocation"], 3);
    assert_eq!(body["wait_seconds"], 5);
}

#[tokio::test]
async fn test_usage_for_unknown_key_is_free() {
    let app = app_with_history(&[(0, 3)], 5).await;
    let (status, body) = get_json(app, "/usage?key=other").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "other");
    assert_eq!(body["used"], 0);
    assert_eq!(body["wait_seconds"], 0);
}

#[tokio::test]
async fn test_unsatisfiable_burst_is_a_bad_request() {
    let app = app_with_history(&[], 0).await;
    let (status, body) = get_json(app, "/usage?requests=4").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("window allocation is only 3"));
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_bad_gateway_but_still_counted() {
    let app = app_with_history(&[], 0).await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/items?page=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let (_, body) = get_json(app, "/usage").await;
    assert_eq!(body["used"], 1);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_before_counting() {
    let app = app_with_history(&[], 0).await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/upload")
                .body(Body::from(vec![b'x'; MAX_BODY_BYTES + 1]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let (_, body) = get_json(app, "/usage").await;
    assert_eq!(body["used"], 0);
}
