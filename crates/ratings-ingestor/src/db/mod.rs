//! Postgres access: connection pool, migrations and repositories

mod brokers;
mod runs;
mod stocks;

pub use brokers::PgBrokerRegistry;
pub use runs::PgRunJournal;
pub use stocks::PgStockStore;

use ratings_common::RatingsError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),

    #[error("{0}")]
    Duplicate(String),

    #[error(transparent)]
    Invalid(#[from] RatingsError),

    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),
}

impl DbError {
    pub fn duplicate(resource_type: &str, identifier: &str) -> Self {
        Self::Duplicate(format!("{} '{}' already exists", resource_type, identifier))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Map unique-constraint violations to [`DbError::Duplicate`].
    pub(crate) fn from_insert(err: sqlx::Error, resource_type: &str, identifier: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::duplicate(resource_type, identifier)
            },
            _ => Self::Sqlx(err),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl DbConfig {
    /// Load from `DATABASE_URL` and `DB_*` variables; the URL is required.
    pub fn from_env() -> DbResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DbError::config("DATABASE_URL not set"))?;

        Ok(Self {
            url,
            max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(DEFAULT_MAX_CONNECTIONS),
            min_connections: env_parse("DB_MIN_CONNECTIONS").unwrap_or(DEFAULT_MIN_CONNECTIONS),
            acquire_timeout_secs: env_parse("DB_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout_secs: Some(
                env_parse("DB_IDLE_TIMEOUT_SECS").unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ),
        })
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.url.trim().is_empty() {
            return Err(DbError::config("Database URL cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(DbError::config("max_connections must be greater than 0"));
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::config("min_connections cannot exceed max_connections"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

pub async fn create_pool(config: &DbConfig) -> DbResult<PgPool> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

    if let Some(idle_timeout) = config.idle_timeout_secs {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("DATABASE_URL", "postgresql://localhost/ratings_test");
        std::env::set_var("DB_MAX_CONNECTIONS", "15");

        let config = DbConfig::from_env().unwrap();
        assert_eq!(config.max_connections, 15);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert!(config.url.ends_with("ratings_test"));
        assert!(config.validate().is_ok());

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("DB_MAX_CONNECTIONS");
    }

    #[test]
    #[serial]
    fn test_config_from_env_missing_url() {
        std::env::remove_var("DATABASE_URL");
        assert!(matches!(DbConfig::from_env(), Err(DbError::Config(_))));
    }

    #[test]
    fn test_validate_pool_bounds() {
        let config = DbConfig {
            url: "postgresql://localhost/ratings".to_string(),
            max_connections: 2,
            min_connections: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_insert_passes_through_other_errors() {
        let err = DbError::from_insert(sqlx::Error::RowNotFound, "Broker", "Jefferies");
        assert!(matches!(err, DbError::Sqlx(sqlx::Error::RowNotFound)));
    }
}
