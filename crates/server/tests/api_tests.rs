//! Integration tests for the HTTP API endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::TestServer;
use serde_json::Value;
use tally_core::AppConfig;
use tally_core::dates::{format_date, today_utc};

#[tokio::test]
async fn record_and_read_total() {
    let server = TestServer::new().await;

    for _ in 0..3 {
        assert_eq!(server.post_view("example.com:8080").await, StatusCode::OK);
    }

    // Normalization: a differently-cased host reads the same counter.
    let (status, body) = server.get_total("EXAMPLE.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "3");
}

#[tokio::test]
async fn unknown_domain_reads_zero_not_error() {
    let server = TestServer::new().await;

    let (status, body) = server.get_total("never-seen.example").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "0");
}

#[tokio::test]
async fn missing_domain_is_bad_request() {
    let server = TestServer::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/view")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.request(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .uri("/api/view")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.request(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn referer_attributes_views_to_the_referring_host() {
    let server = TestServer::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/view")
        .header(header::REFERER, "https://Example.COM:8443/page")
        .header(header::HOST, "counter.local:8080")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.request(request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, count) = server.get_total("example.com").await;
    assert_eq!(count, "1");
    let (_, count) = server.get_total("counter.local").await;
    assert_eq!(count, "0");
}

#[tokio::test]
async fn referer_is_ignored_when_not_trusted() {
    let mut config = AppConfig::for_testing();
    config.domain.trust_referer = false;
    let server = TestServer::with_config(config).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/view")
        .header(header::REFERER, "https://example.com/page")
        .header(header::HOST, "counter.local")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.request(request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, count) = server.get_total("counter.local").await;
    assert_eq!(count, "1");
    let (_, count) = server.get_total("example.com").await;
    assert_eq!(count, "0");
}

#[tokio::test]
async fn x_real_host_overrides_host() {
    let server = TestServer::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/view")
        .header("x-real-host", "public.example:443")
        .header(header::HOST, "internal.local")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.request(request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, count) = server.get_total("public.example").await;
    assert_eq!(count, "1");
}

#[tokio::test]
async fn daily_statistics_default_to_trailing_week() {
    let server = TestServer::new().await;

    server.post_view("example.com").await;
    server.post_view("example.com").await;

    let (status, json) = server.get_daily("example.com", "").await;
    assert_eq!(status, StatusCode::OK);

    let entries = json.as_array().expect("daily response is an array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["date"], Value::from(format_date(today_utc())));
    assert_eq!(entries[0]["count"], Value::from(2));
}

#[tokio::test]
async fn daily_statistics_honor_explicit_range() {
    let server = TestServer::new().await;

    server.post_view("example.com").await;

    let today = format_date(today_utc());
    let (status, json) = server
        .get_daily(
            "example.com",
            &format!("start_date={today}&end_date={today}"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    // A window in the distant past matches nothing.
    let (status, json) = server
        .get_daily("example.com", "start_date=2000-01-01&end_date=2000-01-07")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, Value::Array(vec![]));
}

#[tokio::test]
async fn daily_statistics_empty_is_an_array_not_null() {
    let server = TestServer::new().await;

    let (status, json) = server.get_daily("never-seen.example", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, Value::Array(vec![]));
}

#[tokio::test]
async fn malformed_dates_are_bad_requests() {
    let server = TestServer::new().await;

    let (status, _) = server
        .get_daily("example.com", "start_date=2024-13-99")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.get_daily("example.com", "end_date=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .get_daily("example.com", "start_date=2024-02-01&end_date=2024-01-01")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let server = TestServer::new().await;

    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = server.request(request).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn metrics_endpoint_is_present_by_default() {
    let server = TestServer::new().await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.request(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_can_be_disabled() {
    let mut config = AppConfig::for_testing();
    config.server.metrics_enabled = false;
    let server = TestServer::with_config(config).await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.request(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn separate_domains_count_separately() {
    let server = TestServer::new().await;

    server.post_view("a.example").await;
    server.post_view("b.example").await;
    server.post_view("b.example").await;

    let (_, a) = server.get_total("a.example").await;
    let (_, b) = server.get_total("b.example").await;
    assert_eq!(a, "1");
    assert_eq!(b, "2");
}
