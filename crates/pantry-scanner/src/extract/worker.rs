//! Extract-and-store stage worker

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::Extractor;
use crate::error::IngestError;
use crate::framework::{StageOutcome, StageWorker};
use crate::models::DownloadJob;
use crate::store::MetadataStore;

/// Extracts one job at a time and persists the result with its own store handle
pub struct ExtractWorker {
    extractor: Extractor,
    store: Box<dyn MetadataStore>,
    persisted: Arc<AtomicUsize>,
}

impl ExtractWorker {
    /// `persisted` is shared by every worker of the run and counts stored modules
    pub fn new(
        extractor: Extractor,
        store: Box<dyn MetadataStore>,
        persisted: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            extractor,
            store,
            persisted,
        }
    }

    /// Extract `job`, then upsert the package row and its license row
    ///
    /// Nothing is written unless extraction succeeded. Returns the package id.
    pub async fn ingest(&mut self, job: &DownloadJob) -> Result<i64, IngestError> {
        let extracted = self.extractor.extract(job).await?;
        let (record, licenses) = extracted.into_record(job);

        let id = self.store.upsert_package(&record).await?;
        self.store.upsert_licenses(id, &licenses).await?;

        let total = self.persisted.fetch_add(1, Ordering::SeqCst) + 1;
        info!(module = %job, id, persisted = total, "Module stored");

        Ok(id)
    }
}

#[async_trait]
impl StageWorker<DownloadJob> for ExtractWorker {
    async fn process(&mut self, job: DownloadJob) -> StageOutcome {
        match self.ingest(&job).await {
            Ok(_) => StageOutcome::Completed,
            Err(e) => {
                warn!(module = %job, error = %e, "Module ingestion failed");
                StageOutcome::failed(e)
            }
        }
    }
}
