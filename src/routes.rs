use crate::analytics::{handler, AnalyticsState};
use crate::auth::session::require_session_api;
use crate::clock::Clock;
use crate::settings::{self, SettingsState};
use crate::storage::sqlite;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use deadpool_sqlite::Pool;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Page-view beacons are tiny; anything bigger is not ours.
const TRACK_BODY_LIMIT: usize = 16 * 1024;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub db_ok: bool,
}

/// GET /health
pub async fn health(State(pool): State<Arc<Pool>>) -> Json<HealthResponse> {
    let db_ok = sqlite::ping(&pool).await;
    Json(HealthResponse {
        status: if db_ok { "ok".into() } else { "degraded".into() },
        db_ok,
    })
}

/// Every route except the public tracking beacon.
pub fn api_routes(state: Arc<AnalyticsState>, pool: Pool) -> Router {
    let clock: Arc<dyn Clock> = state.clock.clone();
    let settings_state = Arc::new(SettingsState {
        pool: pool.clone(),
        clock: clock.clone(),
    });
    let session_pool = Arc::new(pool);

    // ── Public analytics ──
    let analytics_public = Router::new()
        .route("/api/analytics/chart", get(handler::chart))
        .route("/api/analytics/top-posts", get(handler::top_posts))
        .with_state(state.clone());

    // ── Admin analytics (session-protected, admin checked in handlers) ──
    let analytics_admin = Router::new()
        .route("/api/analytics", get(handler::totals))
        .route(
            "/api/analytics/adsense",
            get(handler::adsense).post(handler::record_adsense),
        )
        .layer(middleware::from_fn(require_session_api))
        .layer(Extension(session_pool.clone()))
        .layer(Extension(clock.clone()))
        .with_state(state);

    // ── Settings: public read, admin write ──
    let settings_public = Router::new()
        .route("/api/settings", get(settings::get_settings))
        .with_state(settings_state.clone());

    let settings_admin = Router::new()
        .route("/api/settings", put(settings::update_settings))
        .layer(middleware::from_fn(require_session_api))
        .layer(Extension(session_pool.clone()))
        .layer(Extension(clock))
        .with_state(settings_state);

    let health_route = Router::new()
        .route("/health", get(health))
        .with_state(session_pool);

    analytics_public
        .merge(analytics_admin)
        .merge(settings_public)
        .merge(settings_admin)
        .merge(health_route)
}

/// The tracking beacon is called cross-origin from rendered blog pages.
pub fn tracking_routes(state: Arc<AnalyticsState>) -> Router {
    let track_cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/analytics/track", post(handler::track))
        .layer(DefaultBodyLimit::max(TRACK_BODY_LIMIT))
        .layer(track_cors)
        .with_state(state)
}

/// Full application without the per-IP rate limiter, which needs connect info
/// and is layered on in `main`.
pub fn app(state: Arc<AnalyticsState>, pool: Pool) -> Router {
    api_routes(state.clone(), pool).merge(tracking_routes(state))
}
