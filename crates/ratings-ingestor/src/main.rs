//! Ratings ingestor - Main entry point

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ratings_common::logging::{init_logging, LogConfig};
use ratings_ingestor::{
    config::Config,
    db::{self, PgBrokerRegistry, PgRunJournal, PgStockStore},
    ingest::{IngestOrchestrator, IngestScheduler, ProviderClient, StockReader},
    query::{SortField, SortOrder, StockFilters},
};

#[derive(Parser, Debug)]
#[command(name = "ratings-ingestor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run migrations, then ingest on startup and every interval until signalled
    Serve,

    /// Run a single ingestion and print its summary
    RunOnce,

    /// List stored rating events
    Stocks {
        /// Ticker substring
        #[arg(long)]
        ticker: Option<String>,

        /// Company substring
        #[arg(long)]
        company: Option<String>,

        /// Brokerage substring
        #[arg(long)]
        brokerage: Option<String>,

        /// Earliest event time (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Latest event time (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// event_time, ticker, company, target_to or created_at
        #[arg(long)]
        sort: Option<SortField>,

        /// asc or desc
        #[arg(long)]
        order: Option<SortOrder>,

        #[arg(short, long)]
        limit: Option<i64>,

        #[arg(short, long)]
        offset: Option<i64>,
    },

    /// Show every event for one ticker, newest first
    Ticker { ticker: String },

    /// Print aggregate statistics
    Stats,

    /// Show recent ingestion runs
    Runs {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("ratings-ingestor")
        .filter_directives("ratings_ingestor=debug,ratings_common=info,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let config = Config::load()?;
    let pool = db::create_pool(&config.database).await?;

    let result = execute_command(cli.command.unwrap_or(Commands::Serve), &config, pool).await;

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }

    result
}

async fn execute_command(command: Commands, config: &Config, pool: PgPool) -> Result<()> {
    match command {
        Commands::Serve => serve(config, pool).await,

        Commands::RunOnce => {
            db::run_migrations(&pool).await?;
            let orchestrator = build_orchestrator(config, &pool)?;

            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                signal_token.cancel();
            });

            let summary = orchestrator.run_ingestion(&cancel).await?;
            print_json(&json!({
                "run": summary.run,
                "fetched": summary.fetched,
                "reconcile": summary.reconcile,
                "persist": summary.persist,
                "elapsed_ms": summary.elapsed.as_millis() as u64,
            }))
        },

        Commands::Stocks {
            ticker,
            company,
            brokerage,
            from,
            to,
            sort,
            order,
            limit,
            offset,
        } => {
            let filters = StockFilters {
                ticker,
                company,
                brokerage,
                date_from: from,
                date_to: to,
                sort_by: sort.unwrap_or_default(),
                sort_order: order.unwrap_or_default(),
                limit,
                offset,
            };
            let page = build_reader(&pool).list_stocks(&filters).await?;
            print_json(&page)
        },

        Commands::Ticker { ticker } => {
            let stocks = build_reader(&pool).stocks_by_ticker(&ticker).await?;
            if stocks.is_empty() {
                info!(ticker = %ticker, "No events found");
            }
            print_json(&stocks)
        },

        Commands::Stats => {
            let stats = build_reader(&pool).stats().await?;
            print_json(&stats)
        },

        Commands::Runs { limit } => {
            let runs = build_reader(&pool).recent_runs(limit).await?;
            print_json(&runs)
        },

        Commands::Migrate => {
            db::run_migrations(&pool).await?;
            Ok(())
        },
    }
}

async fn serve(config: &Config, pool: PgPool) -> Result<()> {
    db::run_migrations(&pool).await?;

    if !config.ingest.enabled {
        info!("Ingestion is disabled (INGEST_ENABLED=false), nothing to serve");
        return Ok(());
    }

    let orchestrator = Arc::new(build_orchestrator(config, &pool)?);
    let shutdown = CancellationToken::new();

    let scheduler = IngestScheduler::new(
        orchestrator,
        config.ingest.interval,
        config.ingest.run_on_startup,
    );
    let handle = scheduler.start(shutdown.clone());
    info!("Ingestion scheduler running");

    shutdown_signal().await;
    shutdown.cancel();
    handle.await?;

    pool.close().await;
    info!("Shut down gracefully");
    Ok(())
}

/// Read-side queries need only the database, not feed credentials.
fn build_reader(pool: &PgPool) -> StockReader {
    StockReader::new(Arc::new(PgStockStore::new(pool.clone())))
        .with_run_journal(Arc::new(PgRunJournal::new(pool.clone())))
}

fn build_orchestrator(config: &Config, pool: &PgPool) -> Result<IngestOrchestrator> {
    let feed = Arc::new(ProviderClient::new(config.provider.clone())?);
    let registry = Arc::new(PgBrokerRegistry::new(pool.clone()));
    let stocks = Arc::new(PgStockStore::new(pool.clone()));
    let runs = Arc::new(PgRunJournal::new(pool.clone()));

    Ok(IngestOrchestrator::new(feed, registry, stocks, &config.ingest).with_run_journal(runs))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
