//! Configuration management

use anyhow::Context;

use crate::db::DbConfig;
use crate::ingest::{IngestConfig, ProviderConfig};

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub provider: ProviderConfig,
    pub ingest: IngestConfig,
}

impl Config {
    /// Load configuration from `.env` and the environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DbConfig::from_env().context("Failed to load database configuration")?,
            provider: ProviderConfig::from_env(),
            ingest: IngestConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Provider settings are only checked when ingestion is enabled, so the
    /// read-side commands work without feed credentials.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.database.validate()?;
        self.ingest
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid ingestion configuration: {}", e))?;

        if self.ingest.enabled {
            self.provider
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid provider configuration: {}", e))?;
        }

        Ok(())
    }
}
