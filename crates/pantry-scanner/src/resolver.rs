//! Deduplication and version resolution
//!
//! Discovery feeds raw paths into a single admission task that owns the
//! seen-set, so each path is resolved at most once per run. Admitted paths fan
//! out to [`ResolveWorker`]s, which compare the proxy's latest version with the
//! stored one and queue a [`DownloadJob`] only when they differ.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::ModuleProxy;
use crate::error::ResolveError;
use crate::framework::{StageOutcome, StageWorker};
use crate::models::{DownloadJob, LatestInfo};
use crate::store::MetadataStore;

/// Paths already handed to resolution during this run
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<String>,
    duplicates: u64,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path`; false if it was admitted before
    pub fn admit(&mut self, path: &str) -> bool {
        if self.seen.contains(path) {
            self.duplicates += 1;
            return false;
        }
        self.seen.insert(path.to_string());
        true
    }

    /// Distinct paths admitted so far
    pub fn admitted(&self) -> u64 {
        self.seen.len() as u64
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }
}

/// Admission counters reported when the discovery queue closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionReport {
    pub admitted: u64,
    pub duplicates: u64,
}

/// Forward every first-seen path from `input` to `output`
///
/// Ends when `input` closes or the resolve stage goes away. Dropping `output`
/// on return is what closes the resolve queue.
pub async fn admit_paths(
    mut input: mpsc::Receiver<String>,
    output: mpsc::Sender<String>,
) -> AdmissionReport {
    let mut seen = SeenSet::new();

    while let Some(path) = input.recv().await {
        if !seen.admit(&path) {
            debug!(path = %path, "Already resolved in this run, skipping");
            continue;
        }
        if output.send(path).await.is_err() {
            warn!("Resolve stage closed, dropping remaining paths");
            break;
        }
    }

    AdmissionReport {
        admitted: seen.admitted(),
        duplicates: seen.duplicates(),
    }
}

/// Resolve-stage worker owning one store handle
pub struct ResolveWorker {
    proxy: Arc<dyn ModuleProxy>,
    store: Box<dyn MetadataStore>,
    downloads: mpsc::Sender<DownloadJob>,
}

impl ResolveWorker {
    pub fn new(
        proxy: Arc<dyn ModuleProxy>,
        store: Box<dyn MetadataStore>,
        downloads: mpsc::Sender<DownloadJob>,
    ) -> Self {
        Self {
            proxy,
            store,
            downloads,
        }
    }

    /// Latest version of `path` when it differs from the stored one
    pub async fn resolve(&mut self, path: &str) -> Result<Option<LatestInfo>, ResolveError> {
        let latest = self.proxy.latest(path).await?;
        let stored = self.store.stored_version(path).await?;

        if stored.as_deref() == Some(latest.version.as_str()) {
            return Ok(None);
        }

        debug!(
            path = %path,
            stored = stored.as_deref().unwrap_or("-"),
            latest = %latest.version,
            "New version available"
        );
        Ok(Some(latest))
    }
}

#[async_trait]
impl StageWorker<String> for ResolveWorker {
    async fn process(&mut self, path: String) -> StageOutcome {
        let latest = match self.resolve(&path).await {
            Ok(Some(latest)) => latest,
            Ok(None) => {
                debug!(path = %path, "Stored version is current");
                return StageOutcome::skipped("up to date");
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Version resolution failed");
                return StageOutcome::failed(e);
            }
        };

        let job = DownloadJob::new(path, latest);
        if let Err(mpsc::error::SendError(job)) = self.downloads.send(job).await {
            warn!(module = %job, "Extract stage closed, dropping download");
            return StageOutcome::failed("extract stage closed");
        }

        StageOutcome::Completed
    }
}
