use super::period::Period;
use super::series::DailyPoint;
use serde::{Deserialize, Serialize};

/// Query parameters shared by the series endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
    pub limit: Option<i64>,
}

impl PeriodQuery {
    pub fn period(&self) -> Period {
        Period::parse(self.period.as_deref())
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 50)
    }
}

// ── Daily series ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewsPoint {
    pub date: String,
    pub views: i64,
    pub visitors: i64,
}

impl DailyPoint for ViewsPoint {
    fn day(&self) -> &str {
        &self.date
    }

    fn empty(day: String) -> Self {
        Self {
            date: day,
            views: 0,
            visitors: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub date: String,
    pub earnings: f64,
    pub impressions: i64,
}

impl DailyPoint for RevenuePoint {
    fn day(&self) -> &str {
        &self.date
    }

    fn empty(day: String) -> Self {
        Self {
            date: day,
            earnings: 0.0,
            impressions: 0,
        }
    }
}

/// Envelope for the cached list endpoints.
#[derive(Debug, Serialize)]
pub struct SeriesResponse<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub cached: bool,
    pub period: Period,
}

impl<T> SeriesResponse<T> {
    pub fn new(data: Vec<T>, cached: bool, period: Period) -> Self {
        Self {
            success: true,
            data,
            cached,
            period,
        }
    }
}

// ── Totals ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Total<T> {
    pub total: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsTotals {
    pub views: Total<i64>,
    pub visitors: Total<i64>,
    pub earnings: Total<f64>,
    pub impressions: Total<i64>,
}

// ── Top posts ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPost {
    pub path: String,
    pub views: i64,
}

// ── Write paths ──

#[derive(Debug, Deserialize)]
pub struct TrackPageView {
    pub path: String,
    pub visitor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordRevenue {
    pub date: String,
    pub earnings: f64,
    pub impressions: i64,
}
