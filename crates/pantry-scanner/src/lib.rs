//! Pantry scanner
//!
//! Ingestion pipeline that follows the module index feed, resolves the latest
//! version of every path it sees, downloads and unpacks new versions, and
//! persists README, documentation and license metadata for the search index.
//!
//! # Architecture
//!
//! - **Discovery**: pages through the feed from the stored checkpoint
//!   ([`client::IndexClient`], [`checkpoint::Checkpoint`])
//! - **Resolver**: per-run deduplication and latest-version checks
//!   ([`resolver`])
//! - **Extractor + Store**: archive download, safe unpacking, doc rendering,
//!   license classification and idempotent upserts ([`extract`], [`store`])
//!
//! Stages are connected by bounded queues and run as worker pools
//! ([`framework`]); [`orchestrator::ScannerPipeline`] wires them together.
//!
//! # Example
//!
//! ```no_run
//! use pantry_scanner::{config::ScannerConfig, orchestrator::PipelineBuilder, store::PgConnector};
//! use pantry_scanner::store::RetryPolicy;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ScannerConfig::load()?;
//!     let connector = PgConnector::connect_url(
//!         &config.store_url,
//!         config.store_connections(),
//!         RetryPolicy::with_attempts(config.store_retry_attempts),
//!     )
//!     .await?;
//!     let stats = PipelineBuilder::new(config, Arc::new(connector)).build()?.run().await?;
//!     println!("persisted {} modules", stats.persisted);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod framework;
pub mod models;
pub mod orchestrator;
pub mod resolver;
pub mod stats;
pub mod store;

pub use config::ScannerConfig;
pub use error::{ScannerError, ScannerResult};
pub use orchestrator::{PipelineBuilder, ScannerPipeline};
pub use stats::RunStats;
