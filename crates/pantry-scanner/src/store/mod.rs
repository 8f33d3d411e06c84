//! Metadata store
//!
//! Idempotent, path-keyed persistence of package records and their license
//! metadata, plus the key/value checkpoint table. Every long-lived worker asks
//! the [`StoreConnector`] for its own [`MetadataStore`]; stores are never
//! shared between workers.

pub mod memory;
pub mod postgres;
pub mod retry;

pub use memory::{MemoryConnector, MemoryStore};
pub use postgres::{PgConnector, PgStore};
pub use retry::RetryPolicy;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{LicenseSummary, PackageRecord};

/// One worker's handle on the store
#[async_trait]
pub trait MetadataStore: Send {
    /// Version currently stored for `path`, if any
    async fn stored_version(&mut self, path: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite the record keyed by its path; returns the stable row id
    async fn upsert_package(&mut self, record: &PackageRecord) -> Result<i64, StoreError>;

    /// Insert or overwrite the license row of package `id`
    async fn upsert_licenses(
        &mut self,
        id: i64,
        licenses: &LicenseSummary,
    ) -> Result<(), StoreError>;

    async fn read_checkpoint(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    async fn write_checkpoint(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Hands out store handles, one per worker
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MetadataStore>, StoreError>;
}
