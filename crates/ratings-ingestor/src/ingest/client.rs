//! Cursor-paginated client for the analyst rating feed
//!
//! Pages are requested strictly in cursor order. Each page gets up to
//! `max_retries` attempts with exponential backoff on transient failures
//! (network errors, 5xx, 429); any other non-2xx status fails immediately.
//! A terminal page failure aborts the whole fetch and discards the pages
//! already collected.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ratings_common::types::Stock;

use super::config::ProviderConfig;
use super::models::ProviderPage;
use super::parser;

/// Longest response body kept in a status error
const MAX_ERROR_BODY: usize = 512;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

impl FetchError {
    /// Whether another attempt at the same page could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            FetchError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            },
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Source of rating events for one ingestion run
#[async_trait]
pub trait StockFeed: Send + Sync {
    /// Every record across all pages, in page order.
    async fn fetch_all(&self, cancel: &CancellationToken) -> Result<Vec<Stock>, FetchError>;
}

/// One converted page
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub records: Vec<Stock>,
    pub next_cursor: Option<String>,
    /// Items rejected by the parser
    pub dropped: usize,
}

pub struct ProviderClient {
    client: Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self, FetchError> {
        config.validate().map_err(FetchError::Config)?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Fetch and convert the page at `cursor` (`None` for the first page), retrying
    /// transient failures.
    pub async fn fetch_page(
        &self,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FeedPage, FetchError> {
        let page = self.request_with_retry(cursor, cancel).await?;
        let next_cursor = page.next_cursor().map(str::to_owned);

        let mut records = Vec::with_capacity(page.items.len());
        let mut dropped = 0;
        for item in page.items {
            match parser::to_stock(item) {
                Ok(stock) => records.push(stock),
                Err(e) => {
                    dropped += 1;
                    warn!(error = %e, "Dropping malformed provider item");
                },
            }
        }

        Ok(FeedPage {
            records,
            next_cursor,
            dropped,
        })
    }

    async fn request_with_retry(
        &self,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProviderPage, FetchError> {
        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.request_page(cursor) => result,
            };

            match result {
                Ok(page) => return Ok(page),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt == max_attempts => {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                },
                Err(e) => {
                    let wait = self.config.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        cursor = cursor.unwrap_or(""),
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Page request failed, retrying"
                    );
                    pause(wait, cancel).await?;
                },
            }
        }

        Err(FetchError::Config("max_retries must be at least 1".to_string()))
    }

    async fn request_page(&self, cursor: Option<&str>) -> Result<ProviderPage, FetchError> {
        let mut request = self
            .client
            .get(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .header(CONTENT_TYPE, "application/json");

        if let Some(cursor) = cursor {
            request = request.query(&[("next_page", cursor)]);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(FetchError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl StockFeed for ProviderClient {
    async fn fetch_all(&self, cancel: &CancellationToken) -> Result<Vec<Stock>, FetchError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        let mut dropped = 0usize;

        loop {
            if cancel.is_cancelled() {
                info!(pages, "Fetch cancelled before next page");
                return Err(FetchError::Cancelled);
            }

            let page = self.fetch_page(cursor.as_deref(), cancel).await?;
            pages += 1;
            dropped += page.dropped;

            debug!(
                page = pages,
                records = page.records.len(),
                dropped = page.dropped,
                has_next = page.next_cursor.is_some(),
                "Fetched page"
            );

            records.extend(page.records);

            match page.next_cursor {
                Some(next) => {
                    cursor = Some(next);
                    pause(self.config.page_throttle, cancel).await?;
                },
                None => break,
            }
        }

        info!(pages, records = records.len(), dropped, "Fetch complete");
        Ok(records)
    }
}

/// Sleep for `duration` unless cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
