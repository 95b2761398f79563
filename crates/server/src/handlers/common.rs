//! Shared handler helpers and the health endpoint.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use tally_core::dates::{parse_date, today_utc};
use tally_store::ViewStore;
use time::Date;

/// Query parameters for date-ranged statistics.
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Resolve a date-range query to concrete bounds.
///
/// Missing bounds default to the trailing seven days, `[today-6, today]`
/// in UTC. An inverted range is rejected.
pub fn resolve_date_range(query: &DateRangeQuery) -> ApiResult<(Date, Date)> {
    let today = today_utc();
    let start = match &query.start_date {
        Some(raw) => parse_date(raw)?,
        None => today.saturating_sub(time::Duration::days(6)),
    };
    let end = match &query.end_date {
        Some(raw) => parse_date(raw)?,
        None => today,
    };
    if start > end {
        return Err(ApiError::BadRequest(format!(
            "start_date {start} is after end_date {end}"
        )));
    }
    Ok((start, end))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health probe: verifies store connectivity.
/// Intentionally unauthenticated, for load balancers and probes.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.store.health_check().await?;
    Ok(Json(HealthResponse { status: "ok" }))
}
