//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::ip_rate_limit_middleware;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(
            "/api/view",
            get(handlers::get_total).post(handlers::record_view),
        )
        .route("/api/view/daily", get(handlers::get_daily))
        // Health check (intentionally unauthenticated for load balancers/probes)
        .route("/api/health", get(handlers::health_check));

    // SECURITY: when enabled, this endpoint should be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let rate_limit_state = state.rate_limit.clone();

    // Middleware layers are applied in reverse order (outermost first).
    // Order of execution: TraceLayer -> IP rate limit -> handler.
    router
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
