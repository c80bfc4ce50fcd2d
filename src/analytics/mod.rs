pub mod aggregate;
pub mod handler;
pub mod period;
pub mod queries;
pub mod series;
pub mod store;
pub mod types;

use crate::cache::ResponseCache;
use crate::clock::Clock;
use crate::config::AnalyticsConfig;
use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Duration;
use store::AnalyticsStore;

pub const CHART_NAMESPACE: &str = "analytics:chart";
pub const ADSENSE_NAMESPACE: &str = "analytics:adsense";
pub const TOTALS_NAMESPACE: &str = "analytics:totals";
pub const TOP_POSTS_NAMESPACE: &str = "analytics:top-posts";

/// Shared state for analytics endpoints.
pub struct AnalyticsState {
    pub store: Arc<dyn AnalyticsStore>,
    pub cache: Arc<ResponseCache>,
    pub clock: Arc<dyn Clock>,
    pub config: AnalyticsConfig,
    offset: FixedOffset,
}

impl AnalyticsState {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        cache: Arc<ResponseCache>,
        clock: Arc<dyn Clock>,
        config: AnalyticsConfig,
    ) -> Result<Self, String> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            format!(
                "invalid analytics.utc_offset_minutes: {}",
                config.utc_offset_minutes
            )
        })?;
        Ok(Self {
            store,
            cache,
            clock,
            config,
            offset,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}
