//! Scanner error types
//!
//! One enum per failure domain. Only [`FeedError`] from the discovery loop and
//! startup failures surface as a [`ScannerError`]; everything else is scoped to
//! a single module and ends up as a failed [`crate::framework::StageOutcome`].

use thiserror::Error;

/// Result type alias for run-level scanner operations
pub type ScannerResult<T> = std::result::Result<T, ScannerError>;

/// SQLSTATE for serialization failures (Postgres and CockroachDB)
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for detected deadlocks
const SQLSTATE_DEADLOCK: &str = "40P01";

/// Failures reading the upstream index feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Feed returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// A single feed line could not be decoded. Never fatal; the line is skipped.
    #[error("Malformed feed line {line:?}: {source}")]
    Protocol {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures deciding whether a path needs a download
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Latest-version lookup failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Latest-version lookup returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Stored version lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Failures fetching or unpacking a module archive
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Archive download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Archive download returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Archive is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("Archive unpacks to more than {limit} bytes (stopped at {entry})")]
    UnpackLimit { entry: String, limit: u64 },

    #[error("Corrupt archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Filesystem error during extraction: {0}")]
    Io(#[from] std::io::Error),

    #[error("License classification failed: {0}")]
    License(#[from] LicenseError),

    #[error("Extraction task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failures of the documentation-rendering collaborator
#[derive(Error, Debug)]
pub enum DocError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("No documentation command configured")]
    NotConfigured,
}

/// Failures of the license-classification collaborator
#[derive(Error, Debug)]
pub enum LicenseError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("Unreadable classifier output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("No license command configured")]
    NotConfigured,
}

/// Failures of the metadata store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transient conflict; retried inside the transaction wrapper
    #[error("Transaction conflict during {operation}: {source}")]
    Conflict {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{operation} still conflicting after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to connect to store: {0}")]
    Connect(#[source] sqlx::Error),
}

impl StoreError {
    /// Wrap a driver error, classifying transient conflicts
    pub fn from_sqlx(operation: &'static str, source: sqlx::Error) -> Self {
        if is_transient(&source) {
            StoreError::Conflict { operation, source }
        } else {
            StoreError::Database { operation, source }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Whether a driver error is a serialization failure or deadlock worth retrying
pub fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(SQLSTATE_SERIALIZATION_FAILURE) | Some(SQLSTATE_DEADLOCK)
        ),
        _ => false,
    }
}

/// Failure of one module between download and the last store write
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run-level failures that stop the whole scan
#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Feed unavailable: {0}")]
    Feed(#[from] FeedError),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ingesting {module} failed: {source}")]
    Ingest {
        module: String,
        #[source]
        source: IngestError,
    },

    #[error("Stage {stage} panicked: {message}")]
    StagePanicked { stage: String, message: String },

    #[error(transparent)]
    Common(#[from] pantry_common::PantryError),
}
