//! Pipeline orchestrator
//!
//! Wires Discovery → Resolver → Extractor+Store:
//!
//! ```text
//! index feed ─▶ [paths] ─▶ admission (seen-set) ─▶ [resolve] ─▶ ResolveWorker × N
//!                                                                   │
//!                                      ExtractWorker × M ◀─ [downloads]
//! ```
//!
//! Every `[queue]` is bounded. Discovery runs in the calling task; once it
//! stops (module cap reached, feed caught up, or a fatal feed error) it drops
//! its sender and the stages drain in order before [`ScannerPipeline::run`]
//! returns.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::checkpoint::{format_cursor, Checkpoint};
use crate::client::{http_client, IndexClient, ModuleProxy, PackageIndex, ProxyClient};
use crate::config::ScannerConfig;
use crate::error::{FeedError, ScannerError, ScannerResult};
use crate::extract::{
    CommandDocRenderer, CommandLicenseClassifier, DocRenderer, ExtractWorker, Extractor,
    LicenseClassifier, LicensePolicy,
};
use crate::framework::{StageConfig, StagePool};
use crate::models::{DownloadJob, LatestInfo};
use crate::resolver::{admit_paths, ResolveWorker};
use crate::stats::RunStats;
use crate::store::StoreConnector;

/// Assembles a [`ScannerPipeline`] from configuration
///
/// Collaborators default to the HTTP clients and external commands named in
/// [`ScannerConfig`]; tests swap any of them out.
pub struct PipelineBuilder {
    config: ScannerConfig,
    connector: Arc<dyn StoreConnector>,
    index: Option<Arc<dyn PackageIndex>>,
    proxy: Option<Arc<dyn ModuleProxy>>,
    docs: Option<Arc<dyn DocRenderer>>,
    licenses: Option<Arc<dyn LicenseClassifier>>,
}

impl PipelineBuilder {
    pub fn new(config: ScannerConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            config,
            connector,
            index: None,
            proxy: None,
            docs: None,
            licenses: None,
        }
    }

    pub fn index(mut self, index: Arc<dyn PackageIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn proxy(mut self, proxy: Arc<dyn ModuleProxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn doc_renderer(mut self, docs: Arc<dyn DocRenderer>) -> Self {
        self.docs = Some(docs);
        self
    }

    pub fn license_classifier(mut self, licenses: Arc<dyn LicenseClassifier>) -> Self {
        self.licenses = Some(licenses);
        self
    }

    pub fn build(self) -> ScannerResult<ScannerPipeline> {
        self.config.validate()?;

        let client = http_client(self.config.http_timeout())
            .map_err(|e| ScannerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let index = self.index.unwrap_or_else(|| {
            Arc::new(IndexClient::new(client.clone(), self.config.index_url.clone()))
        });

        let proxy = self.proxy.unwrap_or_else(|| {
            Arc::new(ProxyClient::new(
                client,
                self.config.proxy_url.clone(),
                self.config.max_archive_bytes,
            ))
        });

        let docs = self.docs.unwrap_or_else(|| {
            Arc::new(CommandDocRenderer::new(
                self.config.doc_command.clone(),
                self.config.tool_timeout(),
            ))
        });

        let licenses = self.licenses.unwrap_or_else(|| {
            Arc::new(CommandLicenseClassifier::new(
                self.config.license_command.clone(),
                self.config.tool_timeout(),
            ))
        });

        let extractor = Extractor::new(
            Arc::clone(&proxy),
            docs,
            licenses,
            LicensePolicy::new(self.config.license_threshold),
            self.config.scratch_dir.clone(),
        )?
        .with_unpack_limit(self.config.max_unpacked_bytes);

        Ok(ScannerPipeline {
            resolve: StageConfig::new(self.config.resolve_workers, self.config.queue_capacity),
            extract: StageConfig::new(self.config.extract_workers, self.config.queue_capacity),
            max_modules: self.config.max_modules,
            page_limit: self.config.page_limit,
            connector: self.connector,
            index,
            proxy,
            extractor,
        })
    }
}

/// Why discovery stopped admitting work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscoveryEnd {
    ModuleCap,
    CaughtUp,
    Stalled,
    StagesClosed,
}

/// A configured ingestion pipeline
pub struct ScannerPipeline {
    resolve: StageConfig,
    extract: StageConfig,
    max_modules: usize,
    page_limit: usize,
    connector: Arc<dyn StoreConnector>,
    index: Arc<dyn PackageIndex>,
    proxy: Arc<dyn ModuleProxy>,
    extractor: Extractor,
}

impl ScannerPipeline {
    /// Scan the feed from the stored checkpoint until a stop condition fires
    ///
    /// A feed failure stops discovery; work already queued still drains before
    /// the error is returned.
    pub async fn run(&self) -> ScannerResult<RunStats> {
        let mut stats = RunStats::new();
        let persisted = Arc::new(AtomicUsize::new(0));

        let mut checkpoint = Checkpoint::load(self.connector.connect().await?).await;
        info!(
            since = %format_cursor(checkpoint.cursor()),
            max_modules = self.max_modules,
            page_limit = self.page_limit,
            resolve_workers = self.resolve.workers,
            extract_workers = self.extract.workers,
            "Starting scan"
        );

        let (path_tx, path_rx) = self.resolve.queue::<String>();
        let (resolve_tx, resolve_rx) = self.resolve.queue::<String>();
        let (download_tx, download_rx) = self.extract.queue::<DownloadJob>();

        let mut resolvers = Vec::with_capacity(self.resolve.workers);
        for _ in 0..self.resolve.workers {
            resolvers.push(ResolveWorker::new(
                Arc::clone(&self.proxy),
                self.connector.connect().await?,
                download_tx.clone(),
            ));
        }
        drop(download_tx);

        let mut extractors = Vec::with_capacity(self.extract.workers);
        for _ in 0..self.extract.workers {
            extractors.push(ExtractWorker::new(
                self.extractor.clone(),
                self.connector.connect().await?,
                Arc::clone(&persisted),
            ));
        }

        let admission = tokio::spawn(admit_paths(path_rx, resolve_tx));
        let resolve_pool = StagePool::spawn("resolve", resolve_rx, resolvers);
        let extract_pool = StagePool::spawn("extract", download_rx, extractors);

        let discovery = self
            .discover(&mut checkpoint, path_tx, &persisted, &mut stats)
            .await;

        match admission.await {
            Ok(report) => stats.duplicates = report.duplicates,
            Err(e) => {
                return Err(ScannerError::StagePanicked {
                    stage: "admission".to_string(),
                    message: e.to_string(),
                })
            }
        }
        stats.resolve = resolve_pool.join().await?;
        stats.extract = extract_pool.join().await?;

        stats.persisted = persisted.load(Ordering::SeqCst) as u64;
        stats.checkpoint_failures = checkpoint.write_failures();
        stats.final_cursor = Some(checkpoint.cursor());
        stats.complete();
        stats.log_summary();

        match discovery {
            Ok(end) => {
                info!(reason = ?end, "Discovery ended");
                Ok(stats)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn discover(
        &self,
        checkpoint: &mut Checkpoint,
        paths: mpsc::Sender<String>,
        persisted: &AtomicUsize,
        stats: &mut RunStats,
    ) -> Result<DiscoveryEnd, FeedError> {
        loop {
            if persisted.load(Ordering::SeqCst) >= self.max_modules {
                info!(max_modules = self.max_modules, "Module cap reached");
                return Ok(DiscoveryEnd::ModuleCap);
            }

            let since = checkpoint.cursor();
            let batch = self.index.fetch_batch(since, self.page_limit).await?;
            stats.batches += 1;
            stats.malformed_lines += batch.malformed as u64;

            let mut enqueued_max: Option<DateTime<Utc>> = None;
            let mut end = None;

            for entry in &batch.entries {
                if persisted.load(Ordering::SeqCst) >= self.max_modules {
                    info!(max_modules = self.max_modules, "Module cap reached");
                    end = Some(DiscoveryEnd::ModuleCap);
                    break;
                }
                if paths.send(entry.path.clone()).await.is_err() {
                    warn!("Resolve stage closed, stopping discovery");
                    end = Some(DiscoveryEnd::StagesClosed);
                    break;
                }
                stats.discovered += 1;
                enqueued_max = enqueued_max.max(Some(entry.timestamp));
            }

            let advanced = match enqueued_max {
                Some(ts) => checkpoint.advance(ts).await,
                None => false,
            };

            if let Some(end) = end {
                return Ok(end);
            }

            if batch.is_exhausted(self.page_limit) {
                info!(
                    lines = batch.line_count,
                    limit = self.page_limit,
                    "Feed caught up"
                );
                return Ok(DiscoveryEnd::CaughtUp);
            }

            if !advanced {
                warn!(
                    since = %format_cursor(since),
                    "Full page did not advance the cursor, stopping discovery"
                );
                return Ok(DiscoveryEnd::Stalled);
            }
        }
    }

    /// Extract and store one module version, bypassing discovery and resolution
    pub async fn ingest_one(&self, path: &str, version: &str) -> ScannerResult<i64> {
        let job = DownloadJob::new(
            path,
            LatestInfo {
                version: version.to_string(),
                time: Utc::now(),
            },
        );
        info!(module = %job, "Ingesting single module");

        let mut worker = ExtractWorker::new(
            self.extractor.clone(),
            self.connector.connect().await?,
            Arc::new(AtomicUsize::new(0)),
        );

        worker
            .ingest(&job)
            .await
            .map_err(|source| ScannerError::Ingest {
                module: job.to_string(),
                source,
            })
    }
}
