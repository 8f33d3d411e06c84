//! Pantry scanner - module index ingestion

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pantry_common::logging::{init_logging, LogConfig};
use pantry_scanner::store::{MemoryConnector, PgConnector, RetryPolicy, StoreConnector};
use pantry_scanner::{PipelineBuilder, ScannerConfig};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "pantry-scanner")]
#[command(author, version, about = "Module index ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the index feed from the stored checkpoint
    Run {
        /// Keep results in memory instead of writing to the database
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many modules were stored
        #[arg(long)]
        max_modules: Option<usize>,
    },

    /// Extract and store a single module version
    One {
        /// Module path, e.g. github.com/user/repo
        path: String,

        /// Version to ingest, e.g. v1.2.3
        version: String,

        /// Keep results in memory instead of writing to the database
        #[arg(long)]
        dry_run: bool,
    },
}

async fn connector(config: &ScannerConfig, dry_run: bool) -> Result<Arc<dyn StoreConnector>> {
    if dry_run {
        info!("Dry run: results are kept in memory");
        return Ok(Arc::new(MemoryConnector::new()));
    }

    let connector = PgConnector::connect_url(
        &config.store_url,
        config.store_connections(),
        RetryPolicy::with_attempts(config.store_retry_attempts),
    )
    .await
    .context("Failed to connect to the metadata store")?;

    Ok(Arc::new(connector))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("pantry-scanner")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    let mut config = ScannerConfig::load()?;

    match cli.command {
        Command::Run {
            dry_run,
            max_modules,
        } => {
            if let Some(max_modules) = max_modules {
                config.max_modules = max_modules;
            }
            let store = connector(&config, dry_run).await?;
            let pipeline = PipelineBuilder::new(config, store).build()?;
            let stats = pipeline.run().await?;
            info!(
                persisted = stats.persisted,
                failed = stats.extract.failed + stats.resolve.failed,
                "Scan complete"
            );
        },
        Command::One {
            path,
            version,
            dry_run,
        } => {
            let store = connector(&config, dry_run).await?;
            let pipeline = PipelineBuilder::new(config, store).build()?;
            let id = pipeline.ingest_one(&path, &version).await?;
            info!(path = %path, version = %version, id, "Module stored");
        },
    }

    Ok(())
}
