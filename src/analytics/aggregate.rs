use super::period::Period;
use super::series::{day_label, fill_daily_gaps, local_today, window_days};
use super::types::{RevenuePoint, TopPost, ViewsPoint};
use super::AnalyticsState;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

impl AnalyticsState {
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        local_today(now, self.offset())
    }

    /// Dense daily page views for `period`, ending on the day containing `now`.
    pub async fn chart_data(
        &self,
        period: Period,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<ViewsPoint>> {
        let window = window_days(self.today(now), period);
        let since = day_label(window[0]);
        let rows = self.store.daily_views(since).await?;
        Ok(fill_daily_gaps(&window, rows))
    }

    /// Dense daily ad revenue for `period`, ending on the day containing `now`.
    pub async fn adsense_data(
        &self,
        period: Period,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<RevenuePoint>> {
        let window = window_days(self.today(now), period);
        let since = day_label(window[0]);
        let rows = self.store.daily_revenue(since).await?;
        Ok(fill_daily_gaps(&window, rows))
    }

    pub async fn top_posts(
        &self,
        period: Period,
        limit: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<TopPost>> {
        let window = window_days(self.today(now), period);
        self.store.top_paths(day_label(window[0]), limit).await
    }

    /// Return the cached value for `key`, or compute, cache and return it.
    /// The flag is `true` when the value came from the cache.
    pub async fn cached_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> AppResult<(T, bool)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if let Some(cached) = self.cache.get(key) {
            match serde_json::from_str(&cached) {
                Ok(value) => return Ok((value, true)),
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                    self.cache.delete(key);
                }
            }
        }

        let generation = self.cache.generation();
        let value = compute().await?;
        let json = serde_json::to_string(&value)
            .map_err(|e| AppError::Internal(format!("serialize: {e}")))?;
        if !self
            .cache
            .set_if_unchanged(key, json, self.cache_ttl(), generation)
        {
            tracing::debug!(key, "cache invalidated during compute, result not stored");
        }
        Ok((value, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::store::AnalyticsStore;
    use crate::analytics::types::AnalyticsTotals;
    use crate::analytics::ADSENSE_NAMESPACE;
    use crate::cache::TtlCache;
    use crate::clock::{Clock, ManualClock};
    use crate::config::AnalyticsConfig;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// In-memory store returning fixed rows, unsorted, and counting queries.
    #[derive(Default)]
    struct FixedStore {
        views: Vec<ViewsPoint>,
        revenue: Vec<RevenuePoint>,
        queries: AtomicUsize,
        last_since: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl AnalyticsStore for FixedStore {
        async fn daily_views(&self, since: String) -> AppResult<Vec<ViewsPoint>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            *self.last_since.lock().unwrap() = Some(since);
            Ok(self.views.clone())
        }

        async fn daily_revenue(&self, since: String) -> AppResult<Vec<RevenuePoint>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            *self.last_since.lock().unwrap() = Some(since);
            Ok(self.revenue.clone())
        }

        async fn totals(&self) -> AppResult<AnalyticsTotals> {
            Ok(AnalyticsTotals::default())
        }

        async fn top_paths(&self, _since: String, _limit: i64) -> AppResult<Vec<TopPost>> {
            Ok(Vec::new())
        }

        async fn record_page_view(
            &self,
            _day: String,
            _path: String,
            _visitor_id: Option<String>,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn upsert_revenue(&self, _point: RevenuePoint, _at: i64) -> AppResult<()> {
            Ok(())
        }
    }

    fn state(
        store: FixedStore,
        offset_minutes: i32,
    ) -> (AnalyticsState, Arc<FixedStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2024, 1, 7, 15, 0, 0).unwrap(),
        ));
        let store = Arc::new(store);
        let cache = Arc::new(TtlCache::new(64, clock.clone() as Arc<dyn Clock>));
        let config = AnalyticsConfig {
            cache_ttl_secs: 60,
            utc_offset_minutes: offset_minutes,
            ..AnalyticsConfig::default()
        };
        let state = AnalyticsState::new(store.clone(), cache, clock.clone(), config).unwrap();
        (state, store, clock)
    }

    fn views(day: &str, n: i64) -> ViewsPoint {
        ViewsPoint {
            date: day.to_string(),
            views: n,
            visitors: n / 2,
        }
    }

    #[tokio::test]
    async fn test_chart_data_is_dense_and_sorted() {
        let store = FixedStore {
            views: vec![views("2024-01-06", 8), views("2024-01-02", 4)],
            ..FixedStore::default()
        };
        let (state, store, clock) = state(store, 0);

        let series = state.chart_data(Period::Week, clock.now()).await.unwrap();
        assert_eq!(series.len(), 7);
        assert_eq!(series[0].date, "2024-01-01");
        assert_eq!(series[6].date, "2024-01-07");
        assert!(series.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(series[1].views, 4);
        assert_eq!(series[5].views, 8);
        assert_eq!(series[3].views, 0);
        assert_eq!(
            store.last_since.lock().unwrap().as_deref(),
            Some("2024-01-01")
        );
    }

    #[tokio::test]
    async fn test_window_follows_configured_offset() {
        // 15:00 UTC on Jan 7 is already Jan 8 at UTC+10.
        let (state, store, clock) = state(FixedStore::default(), 10 * 60);
        let series = state.adsense_data(Period::Week, clock.now()).await.unwrap();
        assert_eq!(series.last().unwrap().date, "2024-01-08");
        assert_eq!(
            store.last_since.lock().unwrap().as_deref(),
            Some("2024-01-02")
        );
    }

    #[tokio::test]
    async fn test_cached_or_compute_hits_until_ttl_expires() {
        let (state, store, clock) = state(FixedStore::default(), 0);
        let now = clock.now();

        let (_, cached) = state
            .cached_or_compute("analytics:chart:period=7d", || state.chart_data(Period::Week, now))
            .await
            .unwrap();
        assert!(!cached);

        let (data, cached) = state
            .cached_or_compute("analytics:chart:period=7d", || state.chart_data(Period::Week, now))
            .await
            .unwrap();
        assert!(cached);
        assert_eq!(data.len(), 7);
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(61));
        let (_, cached) = state
            .cached_or_compute("analytics:chart:period=7d", || state.chart_data(Period::Week, now))
            .await
            .unwrap();
        assert!(!cached);
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_undecodable_cache_entry_is_recomputed() {
        let (state, store, clock) = state(FixedStore::default(), 0);
        state
            .cache
            .set("k", "not json".to_string(), Duration::from_secs(60));

        let now = clock.now();
        let (data, cached) = state
            .cached_or_compute("k", || state.chart_data(Period::Week, now))
            .await
            .unwrap();
        assert!(!cached);
        assert_eq!(data.len(), 7);
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    }

    /// Revenue store whose first read parks after taking its snapshot of the rows.
    #[derive(Default)]
    struct ParkedRevenueStore {
        revenue: std::sync::Mutex<Vec<RevenuePoint>>,
        park_next: AtomicBool,
        parked: Notify,
        resume: Notify,
    }

    #[async_trait]
    impl AnalyticsStore for ParkedRevenueStore {
        async fn daily_views(&self, _since: String) -> AppResult<Vec<ViewsPoint>> {
            Ok(Vec::new())
        }

        async fn daily_revenue(&self, _since: String) -> AppResult<Vec<RevenuePoint>> {
            let rows = self.revenue.lock().unwrap().clone();
            if self.park_next.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.resume.notified().await;
            }
            Ok(rows)
        }

        async fn totals(&self) -> AppResult<AnalyticsTotals> {
            Ok(AnalyticsTotals::default())
        }

        async fn top_paths(&self, _since: String, _limit: i64) -> AppResult<Vec<TopPost>> {
            Ok(Vec::new())
        }

        async fn record_page_view(
            &self,
            _day: String,
            _path: String,
            _visitor_id: Option<String>,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn upsert_revenue(&self, point: RevenuePoint, _at: i64) -> AppResult<()> {
            self.revenue.lock().unwrap().push(point);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_invalidation_during_compute_is_not_overwritten() {
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2024, 1, 7, 15, 0, 0).unwrap(),
        ));
        let store = Arc::new(ParkedRevenueStore {
            park_next: AtomicBool::new(true),
            ..ParkedRevenueStore::default()
        });
        let cache = Arc::new(TtlCache::new(64, clock.clone() as Arc<dyn Clock>));
        let state = Arc::new(
            AnalyticsState::new(
                store.clone(),
                cache,
                clock.clone(),
                AnalyticsConfig::default(),
            )
            .unwrap(),
        );
        let key = "analytics:adsense:period=7d&until=2024-01-07";
        let now = clock.now();

        let reader = {
            let state = state.clone();
            tokio::spawn(async move {
                state
                    .cached_or_compute(key, || state.adsense_data(Period::Week, now))
                    .await
            })
        };

        // Revenue write lands while the reader holds the old rows.
        store.parked.notified().await;
        store
            .upsert_revenue(
                RevenuePoint {
                    date: "2024-01-07".into(),
                    earnings: 3.0,
                    impressions: 30,
                },
                0,
            )
            .await
            .unwrap();
        state.cache.invalidate_prefix(ADSENSE_NAMESPACE);
        store.resume.notify_one();

        let (old, cached) = reader.await.unwrap().unwrap();
        assert!(!cached);
        assert_eq!(old[6].earnings, 0.0);

        let (fresh, cached) = state
            .cached_or_compute(key, || state.adsense_data(Period::Week, now))
            .await
            .unwrap();
        assert!(!cached, "the pre-write series must not have been cached");
        assert_eq!(fresh[6].earnings, 3.0);
        assert_eq!(fresh[6].impressions, 30);
    }
}
