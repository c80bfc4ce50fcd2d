use super::queries;
use super::types::{AnalyticsTotals, RevenuePoint, TopPost, Total, ViewsPoint};
use crate::error::AppResult;
use crate::storage::sqlite;
use async_trait::async_trait;
use deadpool_sqlite::Pool;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

/// Query surface the aggregator needs from the database.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Per-day view/visitor counts for every day label `>= since`, in any order.
    async fn daily_views(&self, since: String) -> AppResult<Vec<ViewsPoint>>;

    /// Per-day ad revenue for every day label `>= since`, in any order.
    async fn daily_revenue(&self, since: String) -> AppResult<Vec<RevenuePoint>>;

    async fn totals(&self) -> AppResult<AnalyticsTotals>;

    async fn top_paths(&self, since: String, limit: i64) -> AppResult<Vec<TopPost>>;

    async fn record_page_view(
        &self,
        day: String,
        path: String,
        visitor_id: Option<String>,
    ) -> AppResult<()>;

    async fn upsert_revenue(&self, point: RevenuePoint, updated_at_ms: i64) -> AppResult<()>;
}

/// Visitor ids are never stored as sent.
pub fn hash_visitor(visitor_id: &str) -> String {
    hex::encode(Sha256::digest(visitor_id.as_bytes()))
}

pub struct SqliteAnalyticsStore {
    pool: Pool,
}

impl SqliteAnalyticsStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn interact<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        sqlite::interact(&self.pool, f).await
    }
}

#[async_trait]
impl AnalyticsStore for SqliteAnalyticsStore {
    async fn daily_views(&self, since: String) -> AppResult<Vec<ViewsPoint>> {
        self.interact(move |conn| {
            let mut stmt = conn.prepare(queries::DAILY_VIEWS_SQL)?;
            let rows = stmt.query_map(params![since], |row| {
                Ok(ViewsPoint {
                    date: row.get(0)?,
                    views: row.get(1)?,
                    visitors: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
    }

    async fn daily_revenue(&self, since: String) -> AppResult<Vec<RevenuePoint>> {
        self.interact(move |conn| {
            let mut stmt = conn.prepare(queries::DAILY_REVENUE_SQL)?;
            let rows = stmt.query_map(params![since], |row| {
                Ok(RevenuePoint {
                    date: row.get(0)?,
                    earnings: row.get(1)?,
                    impressions: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
    }

    async fn totals(&self) -> AppResult<AnalyticsTotals> {
        self.interact(|conn| {
            conn.query_row(queries::TOTALS_SQL, [], |row| {
                Ok(AnalyticsTotals {
                    views: Total { total: row.get(0)? },
                    visitors: Total { total: row.get(1)? },
                    earnings: Total { total: row.get(2)? },
                    impressions: Total { total: row.get(3)? },
                })
            })
        })
        .await
    }

    async fn top_paths(&self, since: String, limit: i64) -> AppResult<Vec<TopPost>> {
        self.interact(move |conn| {
            let mut stmt = conn.prepare(queries::TOP_PATHS_SQL)?;
            let rows = stmt.query_map(params![since, limit], |row| {
                Ok(TopPost {
                    path: row.get(0)?,
                    views: row.get(1)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
    }

    async fn record_page_view(
        &self,
        day: String,
        path: String,
        visitor_id: Option<String>,
    ) -> AppResult<()> {
        let visitor_hash = visitor_id.as_deref().map(hash_visitor);
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(queries::INCREMENT_VIEW_SQL, params![day, path])?;
            if let Some(hash) = visitor_hash {
                tx.execute(queries::REGISTER_VISITOR_SQL, params![day, hash])?;
            }
            tx.commit()
        })
        .await
    }

    async fn upsert_revenue(&self, point: RevenuePoint, updated_at_ms: i64) -> AppResult<()> {
        self.interact(move |conn| {
            conn.execute(
                queries::UPSERT_REVENUE_SQL,
                params![point.date, point.earnings, point.impressions, updated_at_ms],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    async fn store() -> (SqliteAnalyticsStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("analytics.db"),
            pool_size: 2,
        };
        let pool = sqlite::create_pool(&config).unwrap();
        sqlite::init_pool(&pool).await.unwrap();
        (SqliteAnalyticsStore::new(pool), dir)
    }

    #[tokio::test]
    async fn test_page_views_and_unique_visitors() {
        let (store, _dir) = store().await;
        for visitor in ["alice", "bob", "alice"] {
            store
                .record_page_view(
                    "2024-04-01".into(),
                    "/posts/hello".into(),
                    Some(visitor.into()),
                )
                .await
                .unwrap();
        }
        store
            .record_page_view("2024-04-01".into(), "/about".into(), None)
            .await
            .unwrap();

        let days = store.daily_views("2024-04-01".into()).await.unwrap();
        assert_eq!(
            days,
            vec![ViewsPoint {
                date: "2024-04-01".into(),
                views: 4,
                visitors: 2,
            }]
        );
    }

    #[tokio::test]
    async fn test_daily_views_respects_since() {
        let (store, _dir) = store().await;
        store
            .record_page_view("2024-03-30".into(), "/".into(), None)
            .await
            .unwrap();
        store
            .record_page_view("2024-04-02".into(), "/".into(), None)
            .await
            .unwrap();

        let days = store.daily_views("2024-04-01".into()).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, "2024-04-02");
    }

    #[tokio::test]
    async fn test_revenue_upsert_replaces_day() {
        let (store, _dir) = store().await;
        let day = |earnings: f64, impressions: i64| RevenuePoint {
            date: "2024-04-01".into(),
            earnings,
            impressions,
        };
        store.upsert_revenue(day(1.0, 10), 1).await.unwrap();
        store.upsert_revenue(day(2.5, 40), 2).await.unwrap();

        let rows = store.daily_revenue("2024-01-01".into()).await.unwrap();
        assert_eq!(rows, vec![day(2.5, 40)]);
    }

    #[tokio::test]
    async fn test_totals_on_empty_database_are_zero() {
        let (store, _dir) = store().await;
        assert_eq!(store.totals().await.unwrap(), AnalyticsTotals::default());
    }

    #[tokio::test]
    async fn test_totals_sum_everything() {
        let (store, _dir) = store().await;
        store
            .record_page_view("2024-04-01".into(), "/a".into(), Some("v1".into()))
            .await
            .unwrap();
        store
            .record_page_view("2024-04-02".into(), "/a".into(), Some("v1".into()))
            .await
            .unwrap();
        for (date, earnings, impressions) in [("2024-04-01", 1.5, 100), ("2024-04-02", 2.0, 50)] {
            store
                .upsert_revenue(
                    RevenuePoint {
                        date: date.into(),
                        earnings,
                        impressions,
                    },
                    0,
                )
                .await
                .unwrap();
        }

        let totals = store.totals().await.unwrap();
        assert_eq!(totals.views.total, 2);
        assert_eq!(totals.visitors.total, 2, "one unique visitor on each of two days");
        assert_eq!(totals.earnings.total, 3.5);
        assert_eq!(totals.impressions.total, 150);
    }

    #[tokio::test]
    async fn test_top_paths_ordering_and_limit() {
        let (store, _dir) = store().await;
        for (path, n) in [("/a", 3), ("/b", 5), ("/c", 1)] {
            for _ in 0..n {
                store
                    .record_page_view("2024-04-01".into(), path.into(), None)
                    .await
                    .unwrap();
            }
        }

        let top = store.top_paths("2024-04-01".into(), 2).await.unwrap();
        let paths: Vec<&str> = top.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, ["/b", "/a"]);
        assert_eq!(top[0].views, 5);
    }

    #[test]
    fn test_hash_visitor_is_stable_and_opaque() {
        let h = hash_visitor("visitor-123");
        assert_eq!(h, hash_visitor("visitor-123"));
        assert_eq!(h.len(), 64);
        assert!(!h.contains("visitor"));
    }
}
