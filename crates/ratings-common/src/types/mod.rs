//! Domain types shared by the ingestor and any read-side consumer

mod broker;
mod rating;
mod stock;

pub use broker::{Broker, DEFAULT_CREDIBILITY_SCORE};
pub use rating::{rating_score, ActionCategory};
pub use stock::Stock;
