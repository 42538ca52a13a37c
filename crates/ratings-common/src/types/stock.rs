use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rating::{rating_score, ActionCategory};

/// A single analyst rating event for a ticker.
///
/// `(ticker, event_time)` is the natural key: the same event ingested twice
/// is stored once. Price targets of `0.0` mean the provider did not report one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub id: Uuid,
    pub ticker: String,
    pub company: String,
    /// Set during broker reconciliation
    pub broker_id: Option<Uuid>,
    pub brokerage: String,
    pub action: String,
    pub rating_from: String,
    pub rating_to: String,
    pub target_from: f64,
    pub target_to: f64,
    pub event_time: DateTime<Utc>,
    pub price_close: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    pub fn new(
        ticker: impl Into<String>,
        company: impl Into<String>,
        brokerage: impl Into<String>,
        action: impl Into<String>,
        event_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            company: company.into(),
            broker_id: None,
            brokerage: brokerage.into(),
            action: action.into(),
            rating_from: String::new(),
            rating_to: String::new(),
            target_from: 0.0,
            target_to: 0.0,
            event_time,
            price_close: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_ratings(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rating_from = from.into();
        self.rating_to = to.into();
        self
    }

    pub fn with_targets(mut self, from: f64, to: f64) -> Self {
        self.target_from = from;
        self.target_to = to;
        self
    }

    pub fn natural_key(&self) -> (&str, DateTime<Utc>) {
        (&self.ticker, self.event_time)
    }

    /// Relative change of the price target, e.g. `0.2` for 150 -> 180.
    ///
    /// Zero when either target was not reported.
    pub fn price_target_change(&self) -> f64 {
        if self.target_from <= 0.0 || self.target_to <= 0.0 {
            return 0.0;
        }
        (self.target_to - self.target_from) / self.target_from
    }

    pub fn rating_scores(&self) -> (Option<f64>, Option<f64>) {
        (rating_score(&self.rating_from), rating_score(&self.rating_to))
    }

    /// New score minus old score; unknown labels count as 0.
    pub fn rating_change_score(&self) -> f64 {
        let (from, to) = self.rating_scores();
        to.unwrap_or(0.0) - from.unwrap_or(0.0)
    }

    pub fn action_category(&self) -> ActionCategory {
        ActionCategory::classify(&self.action)
    }

    /// Favourable action, or a rating that moved up.
    pub fn is_recommendation(&self) -> bool {
        self.action_category().is_positive() || self.rating_change_score() > 0.0
    }
}
