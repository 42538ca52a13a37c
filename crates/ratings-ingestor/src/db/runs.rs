//! Ingestion run history backed by the `ingestion_runs` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{DbError, DbResult};
use crate::ingest::models::{IngestionRun, RunPhase, RunStatus};
use crate::ingest::storage::RunJournal;

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    batch_id: String,
    total_records: i64,
    successful_records: i64,
    failed_records: i64,
    status: String,
    error_details: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for IngestionRun {
    type Error = DbError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status: RunStatus = row.status.parse().map_err(DbError::Corrupt)?;
        let phase = match status {
            RunStatus::Running => RunPhase::Idle,
            RunStatus::Completed => RunPhase::Completed,
            RunStatus::Failed => RunPhase::Failed,
        };

        Ok(IngestionRun {
            id: row.id,
            batch_id: row.batch_id,
            total_records: row.total_records,
            successful_records: row.successful_records,
            failed_records: row.failed_records,
            status,
            error_details: row.error_details,
            created_at: row.created_at,
            completed_at: row.completed_at,
            phase,
        })
    }
}

#[derive(Clone)]
pub struct PgRunJournal {
    pool: PgPool,
}

impl PgRunJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunJournal for PgRunJournal {
    async fn record_start(&self, run: &IngestionRun) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_runs (
                id, batch_id, total_records, successful_records, failed_records,
                status, error_details, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.id)
        .bind(&run.batch_id)
        .bind(run.total_records)
        .bind(run.successful_records)
        .bind(run.failed_records)
        .bind(run.status.as_str())
        .bind(&run.error_details)
        .bind(run.created_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_insert(e, "Ingestion run", &run.batch_id))?;

        Ok(())
    }

    async fn record_finish(&self, run: &IngestionRun) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE ingestion_runs
            SET total_records = $2,
                successful_records = $3,
                failed_records = $4,
                status = $5,
                error_details = $6,
                completed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.total_records)
        .bind(run.successful_records)
        .bind(run.failed_records)
        .bind(run.status.as_str())
        .bind(&run.error_details)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: i64) -> DbResult<Vec<IngestionRun>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, batch_id, total_records, successful_records, failed_records,
                   status, error_details, created_at, completed_at
            FROM ingestion_runs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IngestionRun::try_from).collect()
    }
}
