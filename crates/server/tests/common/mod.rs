//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tally_core::AppConfig;
use tally_server::{AppState, create_router};
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server over scratch databases.
    pub async fn new() -> Self {
        Self::with_config(AppConfig::for_testing()).await
    }

    /// Create a test server with a customized configuration. Store paths
    /// are always redirected into the scratch directory.
    pub async fn with_config(mut config: AppConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        config.store.path = temp_dir.path().join("views.db");
        config.store.archive_path = temp_dir.path().join("archive.db");

        let store = tally_store::from_config(&config.store)
            .await
            .expect("Failed to create view store");

        let state = AppState::new(config, store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Send a request and return (status, raw body).
    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        (status, body.to_vec())
    }

    /// Record a view with the given `Host` header.
    pub async fn post_view(&self, host: &str) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/api/view")
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap();
        self.request(request).await.0
    }

    /// Read the plain-text total for the given `Host` header.
    pub async fn get_total(&self, host: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri("/api/view")
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap();
        let (status, body) = self.request(request).await;
        (status, String::from_utf8(body).unwrap())
    }

    /// Read daily statistics for the given `Host` header and query string.
    pub async fn get_daily(&self, host: &str, query: &str) -> (StatusCode, serde_json::Value) {
        let uri = if query.is_empty() {
            "/api/view/daily".to_string()
        } else {
            format!("/api/view/daily?{query}")
        };
        let request = Request::builder()
            .uri(uri)
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap();
        let (status, body) = self.request(request).await;
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).expect("body is not JSON")
        };
        (status, json)
    }
}
