//! Read-side query types
//!
//! Filters, sorting and pagination for listing rating events, plus the
//! aggregate statistics returned by `stats`.
//!
//! # Examples
//!
//! ```rust
//! use ratings_ingestor::query::{Pagination, SortField, StockFilters};
//!
//! let filters = StockFilters {
//!     ticker: Some("AAPL".into()),
//!     sort_by: SortField::TargetTo,
//!     limit: Some(20),
//!     offset: Some(40),
//!     ..Default::default()
//! };
//! assert!(filters.validate().is_ok());
//!
//! let pagination = Pagination::new(filters.offset(), filters.limit(), 95);
//! assert_eq!(pagination.page, 3);
//! assert_eq!(pagination.total_pages, 5);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ratings_common::{RatingsError, Result};

pub const DEFAULT_LIMIT: i64 = 50;

pub const MAX_LIMIT: i64 = 1000;

/// Column a listing is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    EventTime,
    Ticker,
    Company,
    TargetTo,
    CreatedAt,
}

impl SortField {
    /// Qualified column for `ORDER BY`
    pub fn column(self) -> &'static str {
        match self {
            SortField::EventTime => "s.event_time",
            SortField::Ticker => "s.ticker",
            SortField::Company => "s.company",
            SortField::TargetTo => "s.target_to",
            SortField::CreatedAt => "s.created_at",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = RatingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "event_time" | "time" => Ok(SortField::EventTime),
            "ticker" => Ok(SortField::Ticker),
            "company" => Ok(SortField::Company),
            "target_to" | "target" => Ok(SortField::TargetTo),
            "created_at" => Ok(SortField::CreatedAt),
            other => Err(RatingsError::validation(
                "sort_by",
                format!("unsupported sort column '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = RatingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(RatingsError::validation(
                "sort_order",
                format!("expected asc or desc, got '{}'", other),
            )),
        }
    }
}

/// Listing filters. Text filters are case-insensitive substring matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub brokerage: Option<String>,

    /// Inclusive lower bound on event time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on event time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sort_by: SortField,

    #[serde(default)]
    pub sort_order: SortOrder,

    /// Defaults to 50, clamped to 1-1000
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl StockFilters {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Non-blank text filter wrapped for `ILIKE ... ESCAPE '\'`.
    ///
    /// Wildcards in the input match literally.
    pub fn like_pattern(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| format!("%{}%", escape_like(v)))
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(RatingsError::validation(
                    "date_from",
                    "must not be after date_to",
                ));
            }
        }
        if matches!(self.offset, Some(offset) if offset < 0) {
            return Err(RatingsError::validation("offset", "must not be negative"));
        }
        Ok(())
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Pagination metadata derived from offset/limit and the total match count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-indexed
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(offset: i64, limit: i64, total_items: i64) -> Self {
        let limit = limit.max(1);
        let page = (offset.max(0) / limit).saturating_add(1);
        let total = total_items.max(0);
        let total_pages = total / limit + i64::from(total % limit != 0);

        Self {
            page,
            limit,
            total_pages,
            total_items,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination) -> Self {
        Self { items, pagination }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// Per-brokerage activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BrokerageStat {
    pub brokerage: String,
    pub event_count: i64,
    pub credibility_score: f64,
    /// Mean relative target change over events that reported both targets
    pub avg_target_change: Option<f64>,
}

/// An event with a large positive price-target revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TargetMover {
    pub ticker: String,
    pub company: String,
    pub brokerage: String,
    pub target_from: f64,
    pub target_to: f64,
    pub change: f64,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockStats {
    pub total_events: i64,
    pub unique_tickers: i64,
    pub broker_count: i64,
    pub latest_event_time: Option<DateTime<Utc>>,
    pub brokerages: Vec<BrokerageStat>,
    pub top_movers: Vec<TargetMover>,
    pub generated_at: DateTime<Utc>,
}
