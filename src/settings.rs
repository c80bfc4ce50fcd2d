//! Site-wide settings, stored as one JSON document in the `site_settings` key/value table.

use crate::auth::session::{require_admin, SessionUser};
use crate::clock::Clock;
use crate::error::{AppError, AppResult, LoggedJson};
use crate::storage::sqlite;
use axum::extract::State;
use axum::{Extension, Json};
use deadpool_sqlite::Pool;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const SITE_KEY: &str = "site";
const MAX_SITE_NAME_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub site_name: String,
    pub tagline: String,
    pub posts_per_page: u32,
    pub comments_enabled: bool,
    pub adsense_client_id: Option<String>,
}

/// State for the settings routes.
pub struct SettingsState {
    pub pool: Pool,
    pub clock: Arc<dyn Clock>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "My Blog".to_string(),
            tagline: String::new(),
            posts_per_page: 10,
            comments_enabled: true,
            adsense_client_id: None,
        }
    }
}

impl SiteSettings {
    pub fn validate(&self) -> AppResult<()> {
        let name = self.site_name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("site_name is required".to_string()));
        }
        if name.chars().count() > MAX_SITE_NAME_LEN {
            return Err(AppError::Validation(format!(
                "site_name must be at most {MAX_SITE_NAME_LEN} characters"
            )));
        }
        if !(1..=100).contains(&self.posts_per_page) {
            return Err(AppError::Validation(
                "posts_per_page must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read the settings document, creating the default on first access.
///
/// The default is written with `ON CONFLICT DO NOTHING` against the primary key, so racing
/// first readers all end up reading the same single row.
pub async fn load_or_create(pool: &Pool, clock: &dyn Clock) -> AppResult<SiteSettings> {
    let default_json = serde_json::to_string(&SiteSettings::default())
        .map_err(|e| AppError::Internal(format!("serialize: {e}")))?;
    let now = clock.now_ms();

    let stored = sqlite::interact(pool, move |conn| {
        conn.execute(
            "INSERT INTO site_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO NOTHING",
            params![SITE_KEY, default_json, now],
        )?;
        conn.query_row(
            "SELECT value FROM site_settings WHERE key = ?1",
            params![SITE_KEY],
            |row| row.get::<_, String>(0),
        )
    })
    .await?;

    serde_json::from_str(&stored)
        .map_err(|e| AppError::Internal(format!("corrupt site settings document: {e}")))
}

pub async fn save(pool: &Pool, clock: &dyn Clock, settings: &SiteSettings) -> AppResult<()> {
    settings.validate()?;
    let value = serde_json::to_string(settings)
        .map_err(|e| AppError::Internal(format!("serialize: {e}")))?;
    let now = clock.now_ms();

    sqlite::interact(pool, move |conn| {
        conn.execute(
            "INSERT INTO site_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![SITE_KEY, value, now],
        )
    })
    .await?;
    Ok(())
}

/// GET /api/settings
pub async fn get_settings(
    State(state): State<Arc<SettingsState>>,
) -> AppResult<Json<serde_json::Value>> {
    let settings = load_or_create(&state.pool, state.clock.as_ref()).await?;
    Ok(Json(json!({ "success": true, "data": settings })))
}

/// PUT /api/settings (admin)
pub async fn update_settings(
    State(state): State<Arc<SettingsState>>,
    Extension(user): Extension<SessionUser>,
    LoggedJson(mut input): LoggedJson<SiteSettings>,
) -> AppResult<Json<serde_json::Value>> {
    require_admin(&user)?;
    input.site_name = input.site_name.trim().to_string();
    input.adsense_client_id = input
        .adsense_client_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    save(&state.pool, state.clock.as_ref(), &input).await?;
    tracing::info!(user_id = %user.user_id, "site settings updated");
    Ok(Json(json!({ "success": true, "data": input })))
}
