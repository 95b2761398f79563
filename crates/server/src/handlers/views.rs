//! View counting endpoints.

use crate::domain::resolve_domain;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{DateRangeQuery, resolve_date_range};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use tally_core::DomainKey;
use tally_core::dates::{format_date, today_utc};
use tally_store::ViewRepo;

/// One day's view count, as returned by the daily statistics endpoint.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

fn required_domain(state: &AppState, headers: &HeaderMap) -> ApiResult<DomainKey> {
    resolve_domain(headers, state.config.domain.trust_referer).ok_or_else(|| {
        ApiError::BadRequest("no domain could be resolved from the request".to_string())
    })
}

/// `POST /api/view` - record one view for the resolved domain.
///
/// The view is dated with the current UTC calendar date at call time;
/// requests straddling midnight UTC land in different daily buckets.
pub async fn record_view(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let domain = required_domain(&state, &headers)?;
    state.store.record_view(&domain, today_utc()).await?;
    metrics::VIEWS_RECORDED.inc();
    Ok(StatusCode::OK)
}

/// `GET /api/view` - all-time view count for the resolved domain, as a
/// plain-text decimal. A domain with no recorded views reads as `0`,
/// never as an error.
pub async fn get_total(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<String> {
    let domain = required_domain(&state, &headers)?;
    let total = state.store.get_total(&domain).await?;
    metrics::VIEW_READS.inc();
    Ok(total.to_string())
}

/// `GET /api/view/daily` - per-day counts for the resolved domain within
/// the requested range (default: the trailing seven days, UTC). Returns
/// a JSON array, `[]` when empty.
pub async fn get_daily(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<DailyCount>>> {
    let domain = required_domain(&state, &headers)?;
    let (start, end) = resolve_date_range(&query)?;
    let rows = state.store.get_daily_range(&domain, start, end).await?;
    metrics::DAILY_QUERIES.inc();

    let counts = rows
        .into_iter()
        .map(|row| DailyCount {
            date: format_date(row.date),
            count: row.count,
        })
        .collect();
    Ok(Json(counts))
}
