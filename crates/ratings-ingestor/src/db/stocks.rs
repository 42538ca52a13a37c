//! Rating event storage backed by the `stocks` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use ratings_common::types::Stock;

use super::DbResult;
use crate::ingest::storage::StockStore;
use crate::query::{BrokerageStat, Page, Pagination, StockFilters, StockStats, TargetMover};

const STOCK_COLUMNS: &str = r#"
    s.id, s.ticker, s.company, s.broker_id,
    COALESCE(b.name, s.brokerage) AS brokerage,
    s.action, s.rating_from, s.rating_to, s.target_from, s.target_to,
    s.event_time, s.price_close, s.created_at, s.updated_at
"#;

const STOCKS_JOIN_BROKERS: &str = " FROM stocks s LEFT JOIN brokers b ON b.id = s.broker_id";

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: Uuid,
    ticker: String,
    company: String,
    broker_id: Option<Uuid>,
    brokerage: String,
    action: String,
    rating_from: String,
    rating_to: String,
    target_from: f64,
    target_to: f64,
    event_time: DateTime<Utc>,
    price_close: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for Stock {
    fn from(row: StockRow) -> Self {
        Stock {
            id: row.id,
            ticker: row.ticker,
            company: row.company,
            broker_id: row.broker_id,
            brokerage: row.brokerage,
            action: row.action,
            rating_from: row.rating_from,
            rating_to: row.rating_to,
            target_from: row.target_from,
            target_to: row.target_to,
            event_time: row.event_time,
            price_close: row.price_close,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgStockStore {
    pool: PgPool,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const LIKE_ESCAPE: &str = r" ESCAPE '\'";

/// Append the `WHERE` clause for `filters` to a query over `stocks s` joined with `brokers b`.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &StockFilters) {
    qb.push(" WHERE TRUE");

    if let Some(pattern) = StockFilters::like_pattern(&filters.ticker) {
        qb.push(" AND s.ticker ILIKE ")
            .push_bind(pattern)
            .push(LIKE_ESCAPE);
    }
    if let Some(pattern) = StockFilters::like_pattern(&filters.company) {
        qb.push(" AND s.company ILIKE ")
            .push_bind(pattern)
            .push(LIKE_ESCAPE);
    }
    if let Some(pattern) = StockFilters::like_pattern(&filters.brokerage) {
        qb.push(" AND COALESCE(b.name, s.brokerage) ILIKE ")
            .push_bind(pattern)
            .push(LIKE_ESCAPE);
    }
    if let Some(from) = filters.date_from {
        qb.push(" AND s.event_time >= ").push_bind(from);
    }
    if let Some(to) = filters.date_to {
        qb.push(" AND s.event_time <= ").push_bind(to);
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn bulk_upsert(&self, stocks: &[Stock]) -> DbResult<u64> {
        if stocks.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO stocks (
                id, ticker, company, broker_id, brokerage, action,
                rating_from, rating_to, target_from, target_to,
                event_time, price_close, created_at, updated_at
            )
            "#,
        );

        query_builder.push_values(stocks, |mut b, stock| {
            b.push_bind(stock.id)
                .push_bind(&stock.ticker)
                .push_bind(&stock.company)
                .push_bind(stock.broker_id)
                .push_bind(&stock.brokerage)
                .push_bind(&stock.action)
                .push_bind(&stock.rating_from)
                .push_bind(&stock.rating_to)
                .push_bind(stock.target_from)
                .push_bind(stock.target_to)
                .push_bind(stock.event_time)
                .push_bind(stock.price_close)
                .push_bind(stock.created_at)
                .push_bind(stock.updated_at);
        });
        query_builder.push(" ON CONFLICT (ticker, event_time) DO NOTHING");

        let inserted = query_builder
            .build()
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        debug!(
            submitted = stocks.len(),
            inserted,
            skipped = stocks.len() as u64 - inserted,
            "Stock batch committed"
        );

        Ok(inserted)
    }

    async fn list(&self, filters: &StockFilters) -> DbResult<Page<Stock>> {
        filters.validate()?;
        let limit = filters.limit();
        let offset = filters.offset();

        let mut count_query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*){}", STOCKS_JOIN_BROKERS));
        push_filters(&mut count_query, filters);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {}{}", STOCK_COLUMNS, STOCKS_JOIN_BROKERS));
        push_filters(&mut query, filters);
        query.push(format!(
            " ORDER BY {} {}, s.id",
            filters.sort_by.column(),
            filters.sort_order.as_sql()
        ));
        query.push(" LIMIT ").push_bind(limit);
        query.push(" OFFSET ").push_bind(offset);

        let rows: Vec<StockRow> = query.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page::new(
            rows.into_iter().map(Stock::from).collect(),
            Pagination::new(offset, limit, total),
        ))
    }

    async fn by_ticker(&self, ticker: &str) -> DbResult<Vec<Stock>> {
        let sql = format!(
            "SELECT {}{} WHERE UPPER(s.ticker) = UPPER($1) ORDER BY s.event_time DESC",
            STOCK_COLUMNS, STOCKS_JOIN_BROKERS
        );

        let rows = sqlx::query_as::<_, StockRow>(&sql)
            .bind(ticker.trim())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Stock::from).collect())
    }

    async fn stats(&self, top_movers: i64) -> DbResult<StockStats> {
        let totals = sqlx::query_as::<_, (i64, i64, Option<DateTime<Utc>>)>(
            "SELECT COUNT(*), COUNT(DISTINCT ticker), MAX(event_time) FROM stocks",
        )
        .fetch_one(&self.pool);

        let broker_count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM brokers").fetch_one(&self.pool);

        let brokerages = sqlx::query_as::<_, BrokerageStat>(
            r#"
            SELECT b.name AS brokerage,
                   COUNT(s.id) AS event_count,
                   b.credibility_score,
                   AVG(CASE WHEN s.target_from > 0 AND s.target_to > 0
                            THEN (s.target_to - s.target_from) / s.target_from
                       END) AS avg_target_change
            FROM brokers b
            JOIN stocks s ON s.broker_id = b.id
            GROUP BY b.id, b.name, b.credibility_score
            ORDER BY event_count DESC, b.name
            "#,
        )
        .fetch_all(&self.pool);

        let movers = sqlx::query_as::<_, TargetMover>(
            r#"
            SELECT s.ticker, s.company,
                   COALESCE(b.name, s.brokerage) AS brokerage,
                   s.target_from, s.target_to,
                   (s.target_to - s.target_from) / s.target_from AS change,
                   s.event_time
            FROM stocks s
            LEFT JOIN brokers b ON b.id = s.broker_id
            WHERE s.target_from > 0 AND s.target_to > s.target_from
            ORDER BY change DESC, s.event_time DESC
            LIMIT $1
            "#,
        )
        .bind(top_movers.max(0))
        .fetch_all(&self.pool);

        let ((total_events, unique_tickers, latest_event_time), broker_count, brokerages, top_movers) =
            tokio::try_join!(totals, broker_count, brokerages, movers)?;

        Ok(StockStats {
            total_events,
            unique_tickers,
            broker_count,
            latest_event_time,
            brokerages,
            top_movers,
            generated_at: Utc::now(),
        })
    }
}
