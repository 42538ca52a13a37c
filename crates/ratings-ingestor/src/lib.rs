//! Analyst rating ingestion service
//!
//! Pulls rating events from the provider feed, reconciles brokerages against
//! the broker registry and bulk-persists events into Postgres. The same
//! orchestrator serves listing, per-ticker and statistics queries.

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod ingest;
pub mod query;
