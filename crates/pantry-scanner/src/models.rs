//! Data carried between pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the index feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// One page of the index feed
#[derive(Debug, Clone, Default)]
pub struct IndexBatch {
    /// Successfully decoded entries, in feed order
    pub entries: Vec<IndexEntry>,
    /// Non-blank lines received, including malformed ones
    pub line_count: usize,
    /// Lines that failed to decode and were skipped
    pub malformed: usize,
}

impl IndexBatch {
    /// Greatest timestamp in the batch, if any entry decoded
    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.timestamp).max()
    }

    /// The feed returned fewer lines than requested, so it has caught up
    pub fn is_exhausted(&self, limit: usize) -> bool {
        self.line_count < limit
    }
}

/// Response of the latest-version endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
}

/// A module version that must be downloaded and persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub path: String,
    pub version: String,
    pub published: DateTime<Utc>,
}

impl DownloadJob {
    pub fn new(path: impl Into<String>, info: LatestInfo) -> Self {
        Self {
            path: path.into(),
            version: info.version,
            published: info.time,
        }
    }
}

impl std::fmt::Display for DownloadJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.path, self.version)
    }
}

/// Row of the `packages` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub path: String,
    pub version: String,
    pub readme: String,
    pub docs: String,
    pub time: DateTime<Utc>,
}

/// License data derived from classifier output, one-to-one with a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseSummary {
    /// First accepted identifier by confidence, then name; empty when none qualified
    pub primary: String,
    /// Every accepted identifier, highest confidence first
    pub licenses: Vec<String>,
}

impl LicenseSummary {
    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty()
    }
}

/// Everything extraction produced for one module version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPackage {
    pub readme: String,
    pub docs: String,
    pub licenses: LicenseSummary,
}

impl ExtractedPackage {
    pub fn into_record(self, job: &DownloadJob) -> (PackageRecord, LicenseSummary) {
        let record = PackageRecord {
            path: job.path.clone(),
            version: job.version.clone(),
            readme: self.readme,
            docs: self.docs,
            time: job.published,
        };
        (record, self.licenses)
    }
}
