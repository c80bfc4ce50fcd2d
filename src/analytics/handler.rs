use crate::analytics::period::Period;
use crate::analytics::series::{day_label, DAY_LABEL_FORMAT};
use crate::analytics::types::*;
use crate::analytics::{
    AnalyticsState, ADSENSE_NAMESPACE, CHART_NAMESPACE, TOP_POSTS_NAMESPACE, TOTALS_NAMESPACE,
};
use crate::auth::session::{require_admin, SessionUser};
use crate::cache::generate_key;
use crate::error::{AppError, AppResult, LoggedJson, LoggedQuery};
use axum::extract::State;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;

const MAX_PATH_LEN: usize = 512;
const MAX_VISITOR_ID_LEN: usize = 128;

/// Series keys carry the window's last day so a new day never reads yesterday's window.
fn period_key(namespace: &str, period: Period, today: NaiveDate) -> String {
    generate_key(
        namespace,
        [("period", period.to_string()), ("until", day_label(today))],
    )
}

/// GET /api/analytics/chart
pub async fn chart(
    State(state): State<Arc<AnalyticsState>>,
    LoggedQuery(qp): LoggedQuery<PeriodQuery>,
) -> AppResult<Json<SeriesResponse<ViewsPoint>>> {
    let period = qp.period();
    let now = state.clock.now();
    let key = period_key(CHART_NAMESPACE, period, state.today(now));

    let (data, cached) = state
        .cached_or_compute(&key, || state.chart_data(period, now))
        .await?;
    Ok(Json(SeriesResponse::new(data, cached, period)))
}

/// GET /api/analytics (admin)
pub async fn totals(
    State(state): State<Arc<AnalyticsState>>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Json<AnalyticsTotals>> {
    require_admin(&user)?;
    let (totals, _) = state
        .cached_or_compute(TOTALS_NAMESPACE, || state.store.totals())
        .await?;
    Ok(Json(totals))
}

/// GET /api/analytics/adsense (admin)
pub async fn adsense(
    State(state): State<Arc<AnalyticsState>>,
    Extension(user): Extension<SessionUser>,
    LoggedQuery(qp): LoggedQuery<PeriodQuery>,
) -> AppResult<Json<SeriesResponse<RevenuePoint>>> {
    require_admin(&user)?;
    let period = qp.period();
    let now = state.clock.now();
    let key = period_key(ADSENSE_NAMESPACE, period, state.today(now));

    let (data, cached) = state
        .cached_or_compute(&key, || state.adsense_data(period, now))
        .await?;
    Ok(Json(SeriesResponse::new(data, cached, period)))
}

/// POST /api/analytics/adsense (admin) - record or correct one day's revenue.
pub async fn record_adsense(
    State(state): State<Arc<AnalyticsState>>,
    Extension(user): Extension<SessionUser>,
    LoggedJson(input): LoggedJson<RecordRevenue>,
) -> AppResult<Json<serde_json::Value>> {
    require_admin(&user)?;
    let point = validate_revenue(input)?;
    let now_ms = state.clock.now_ms();

    state.store.upsert_revenue(point.clone(), now_ms).await?;

    // Revenue edits are rare and the admin expects to see them right away.
    let purged = state.cache.invalidate_prefix(ADSENSE_NAMESPACE)
        + state.cache.invalidate_prefix(TOTALS_NAMESPACE);
    tracing::info!(
        date = %point.date,
        earnings = point.earnings,
        impressions = point.impressions,
        purged,
        "ad revenue recorded"
    );

    Ok(Json(json!({ "success": true, "data": point })))
}

/// GET /api/analytics/top-posts
pub async fn top_posts(
    State(state): State<Arc<AnalyticsState>>,
    LoggedQuery(qp): LoggedQuery<PeriodQuery>,
) -> AppResult<Json<SeriesResponse<TopPost>>> {
    let period = qp.period();
    let limit = qp.limit();
    let now = state.clock.now();
    let key = generate_key(
        TOP_POSTS_NAMESPACE,
        [
            ("period", period.to_string()),
            ("limit", limit.to_string()),
            ("until", day_label(state.today(now))),
        ],
    );

    let (data, cached) = state
        .cached_or_compute(&key, || state.top_posts(period, limit, now))
        .await?;
    Ok(Json(SeriesResponse::new(data, cached, period)))
}

/// POST /api/analytics/track
///
/// Does not touch the cache: chart and top-post data may lag by up to one TTL.
pub async fn track(
    State(state): State<Arc<AnalyticsState>>,
    LoggedJson(input): LoggedJson<TrackPageView>,
) -> AppResult<Json<serde_json::Value>> {
    let (path, visitor_id) = validate_track(input)?;
    let day = day_label(state.today(state.clock.now()));

    state.store.record_page_view(day, path, visitor_id).await?;
    Ok(Json(json!({ "success": true })))
}

fn validate_track(input: TrackPageView) -> AppResult<(String, Option<String>)> {
    let path = input.path.trim().to_string();
    if path.is_empty() {
        return Err(AppError::Validation("path is required".to_string()));
    }
    if !path.starts_with('/') {
        return Err(AppError::Validation("path must start with '/'".to_string()));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(AppError::Validation(format!(
            "path must be at most {MAX_PATH_LEN} bytes"
        )));
    }

    let visitor_id = input
        .visitor_id
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if visitor_id
        .as_ref()
        .is_some_and(|v| v.len() > MAX_VISITOR_ID_LEN)
    {
        return Err(AppError::Validation(format!(
            "visitor_id must be at most {MAX_VISITOR_ID_LEN} bytes"
        )));
    }
    Ok((path, visitor_id))
}

fn validate_revenue(input: RecordRevenue) -> AppResult<RevenuePoint> {
    let day = NaiveDate::parse_from_str(input.date.trim(), DAY_LABEL_FORMAT)
        .map_err(|_| AppError::Validation("date must be formatted YYYY-MM-DD".to_string()))?;
    if !input.earnings.is_finite() || input.earnings < 0.0 {
        return Err(AppError::Validation(
            "earnings must be a non-negative number".to_string(),
        ));
    }
    if input.impressions < 0 {
        return Err(AppError::Validation(
            "impressions must be non-negative".to_string(),
        ));
    }
    Ok(RevenuePoint {
        date: day_label(day),
        earnings: input.earnings,
        impressions: input.impressions,
    })
}
