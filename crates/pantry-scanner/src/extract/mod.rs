//! Archive extraction
//!
//! Turns a [`DownloadJob`] into an [`ExtractedPackage`]: download the archive,
//! unpack it into a scratch directory private to the job, collect the README
//! blob, render documentation and classify licenses. The scratch directory is
//! removed when the job ends, whatever the outcome.

pub mod archive;
pub mod docs;
pub mod license;
pub mod worker;

pub use archive::{unpack_archive, UnpackedArchive, README_PATTERN};
pub use docs::{CommandDocRenderer, DocRenderer};
pub use license::{
    parse_detector_output, CommandLicenseClassifier, LicenseClassifier, LicenseMatches,
    LicensePolicy,
};
pub use worker::ExtractWorker;

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::client::ModuleProxy;
use crate::config::DEFAULT_MAX_UNPACKED_BYTES;
use crate::error::{ExtractError, ScannerError};
use crate::models::{DownloadJob, ExtractedPackage};

/// Everything needed to extract one module version; cheap to clone per worker
#[derive(Clone)]
pub struct Extractor {
    proxy: Arc<dyn ModuleProxy>,
    docs: Arc<dyn DocRenderer>,
    licenses: Arc<dyn LicenseClassifier>,
    policy: LicensePolicy,
    scratch_root: PathBuf,
    readme_pattern: Regex,
    max_unpacked_bytes: u64,
}

impl Extractor {
    pub fn new(
        proxy: Arc<dyn ModuleProxy>,
        docs: Arc<dyn DocRenderer>,
        licenses: Arc<dyn LicenseClassifier>,
        policy: LicensePolicy,
        scratch_root: impl Into<PathBuf>,
    ) -> Result<Self, ScannerError> {
        let readme_pattern = Regex::new(README_PATTERN)
            .map_err(|e| ScannerError::Config(format!("Invalid README pattern: {}", e)))?;

        Ok(Self {
            proxy,
            docs,
            licenses,
            policy,
            scratch_root: scratch_root.into(),
            readme_pattern,
            max_unpacked_bytes: DEFAULT_MAX_UNPACKED_BYTES,
        })
    }

    /// Fail archives that unpack to more than `bytes`
    pub fn with_unpack_limit(mut self, bytes: u64) -> Self {
        self.max_unpacked_bytes = bytes;
        self
    }

    /// Download, unpack and analyse `job`
    pub async fn extract(&self, job: &DownloadJob) -> Result<ExtractedPackage, ExtractError> {
        let data = self.proxy.fetch_archive(&job.path, &job.version).await?;
        debug!(module = %job, bytes = data.len(), "Archive downloaded");

        let scratch = self.scratch_dir().await?;
        let result = self.analyse(job, data, scratch.path()).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(dir = %scratch_path.display(), error = %e, "Failed to remove scratch directory");
        }

        result
    }

    async fn scratch_dir(&self) -> Result<TempDir, ExtractError> {
        tokio::fs::create_dir_all(&self.scratch_root).await?;
        Ok(tempfile::Builder::new()
            .prefix("mod-")
            .tempdir_in(&self.scratch_root)?)
    }

    async fn analyse(
        &self,
        job: &DownloadJob,
        data: Vec<u8>,
        root: &Path,
    ) -> Result<ExtractedPackage, ExtractError> {
        let prefix = job.to_string();
        let pattern = self.readme_pattern.clone();
        let unpack_root = root.to_path_buf();
        let limit = self.max_unpacked_bytes;

        let unpacked = tokio::task::spawn_blocking(move || {
            unpack_archive(&data, &unpack_root, &prefix, &pattern, limit)
        })
        .await??;

        if unpacked.rejected > 0 {
            warn!(module = %job, rejected = unpacked.rejected, "Archive contained entries outside the module root");
        }

        let docs = match self.docs.render(root).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(module = %job, error = %e, "Documentation rendering failed, leaving docs empty");
                String::new()
            }
        };

        let matches = self.licenses.classify(root).await?;
        let licenses = self.policy.apply(&matches);

        info!(
            module = %job,
            files = unpacked.files_written,
            readme_bytes = unpacked.readme.len(),
            docs_bytes = docs.len(),
            license = %licenses.primary,
            "Module extracted"
        );

        Ok(ExtractedPackage {
            readme: unpacked.readme,
            docs,
            licenses,
        })
    }
}
