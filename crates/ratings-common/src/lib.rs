//! Ratings Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared domain types, logging, and error handling for the ratings workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`RatingsError`] and the crate-wide [`Result`] alias
//! - **Logging**: environment-driven `tracing` initialisation
//! - **Types**: analyst rating events, brokers, and rating analytics
//!
//! # Example
//!
//! ```no_run
//! use ratings_common::types::{ActionCategory, Stock};
//! use chrono::Utc;
//!
//! let stock = Stock::new("AAPL", "Apple Inc.", "Goldman Sachs", "upgraded by", Utc::now());
//! assert_eq!(stock.action_category(), ActionCategory::Upgrade);
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{RatingsError, Result};
