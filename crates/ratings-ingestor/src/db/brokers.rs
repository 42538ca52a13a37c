//! Broker registry backed by the `brokers` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use ratings_common::types::Broker;

use super::{DbError, DbResult};
use crate::ingest::storage::BrokerRegistry;

#[derive(Debug, sqlx::FromRow)]
struct BrokerRow {
    id: Uuid,
    name: String,
    credibility_score: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BrokerRow> for Broker {
    fn from(row: BrokerRow) -> Self {
        Broker {
            id: row.id,
            name: row.name,
            credibility_score: row.credibility_score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgBrokerRegistry {
    pool: PgPool,
}

impl PgBrokerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BrokerRegistry for PgBrokerRegistry {
    async fn create(&self, broker: &Broker) -> DbResult<()> {
        broker.validate()?;

        sqlx::query(
            r#"
            INSERT INTO brokers (id, name, credibility_score, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(broker.id)
        .bind(&broker.name)
        .bind(broker.credibility_score)
        .bind(broker.created_at)
        .bind(broker.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_insert(e, "Broker", &broker.name))?;

        Ok(())
    }

    async fn get_all(&self) -> DbResult<Vec<Broker>> {
        let rows = sqlx::query_as::<_, BrokerRow>(
            r#"
            SELECT id, name, credibility_score, created_at, updated_at
            FROM brokers
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Broker::from).collect())
    }

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Broker>> {
        let row = sqlx::query_as::<_, BrokerRow>(
            r#"
            SELECT id, name, credibility_score, created_at, updated_at
            FROM brokers
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Broker::from))
    }
}
