//! Conversions from provider text to typed values

use chrono::{DateTime, Utc};
use thiserror::Error;

use ratings_common::types::Stock;

use super::models::ProviderItem;

/// Why a provider item was dropped
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemError {
    #[error("item has no ticker")]
    MissingTicker,

    #[error("invalid timestamp '{raw}' for {ticker}: {reason}")]
    InvalidTimestamp {
        ticker: String,
        raw: String,
        reason: String,
    },
}

/// Parse a currency string such as `"$1,250.75"`.
///
/// Dollar signs, thousands separators and whitespace are stripped. Anything
/// that still does not parse as a finite number yields `0.0`, which callers
/// treat as "not reported".
pub fn parse_price(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

pub fn parse_event_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|t| t.with_timezone(&Utc))
}

/// Build a rating event from a provider item.
///
/// Items without a ticker or with an unparseable timestamp cannot form a
/// natural key and are rejected; bad prices only zero the affected field.
pub fn to_stock(item: ProviderItem) -> Result<Stock, ItemError> {
    let ticker = item.ticker.trim();
    if ticker.is_empty() {
        return Err(ItemError::MissingTicker);
    }

    let event_time = parse_event_time(&item.time).map_err(|e| ItemError::InvalidTimestamp {
        ticker: ticker.to_string(),
        raw: item.time.clone(),
        reason: e.to_string(),
    })?;

    Ok(Stock::new(
        ticker,
        item.company.trim(),
        item.brokerage.trim(),
        item.action.trim(),
        event_time,
    )
    .with_ratings(item.rating_from.trim(), item.rating_to.trim())
    .with_targets(parse_price(&item.target_from), parse_price(&item.target_to)))
}
