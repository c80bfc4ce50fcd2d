/// Daily page views and unique visitors.
/// Parameters: ?1 = first day label (inclusive)
pub const DAILY_VIEWS_SQL: &str = r#"
SELECT
    p.day,
    SUM(p.views) AS views,
    (SELECT COUNT(*) FROM daily_visitors v WHERE v.day = p.day) AS visitors
FROM page_views p
WHERE p.day >= ?1
GROUP BY p.day
ORDER BY p.day
"#;

/// Daily ad revenue.
/// Parameters: ?1 = first day label (inclusive)
pub const DAILY_REVENUE_SQL: &str = r#"
SELECT day, earnings, impressions
FROM ad_revenue
WHERE day >= ?1
ORDER BY day
"#;

/// Whole-table totals for the dashboard summary cards.
pub const TOTALS_SQL: &str = r#"
SELECT
    (SELECT COALESCE(SUM(views), 0) FROM page_views) AS views,
    (SELECT COUNT(*) FROM daily_visitors) AS visitors,
    (SELECT COALESCE(SUM(earnings), 0.0) FROM ad_revenue) AS earnings,
    (SELECT COALESCE(SUM(impressions), 0) FROM ad_revenue) AS impressions
"#;

/// Most viewed paths in a window.
/// Parameters: ?1 = first day label (inclusive), ?2 = limit
pub const TOP_PATHS_SQL: &str = r#"
SELECT path, SUM(views) AS views
FROM page_views
WHERE day >= ?1
GROUP BY path
ORDER BY views DESC, path ASC
LIMIT ?2
"#;

/// Parameters: ?1 = day, ?2 = path
pub const INCREMENT_VIEW_SQL: &str = r#"
INSERT INTO page_views (day, path, views)
VALUES (?1, ?2, 1)
ON CONFLICT (day, path) DO UPDATE SET views = views + 1
"#;

/// Parameters: ?1 = day, ?2 = visitor hash
pub const REGISTER_VISITOR_SQL: &str = r#"
INSERT OR IGNORE INTO daily_visitors (day, visitor_hash)
VALUES (?1, ?2)
"#;

/// Parameters: ?1 = day, ?2 = earnings, ?3 = impressions, ?4 = updated_at (ms)
pub const UPSERT_REVENUE_SQL: &str = r#"
INSERT INTO ad_revenue (day, earnings, impressions, updated_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (day) DO UPDATE SET
    earnings = excluded.earnings,
    impressions = excluded.impressions,
    updated_at = excluded.updated_at
"#;
