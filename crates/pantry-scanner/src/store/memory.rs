//! In-memory store for dry runs and tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{MetadataStore, StoreConnector};
use crate::error::StoreError;
use crate::models::{LicenseSummary, PackageRecord};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    packages: BTreeMap<String, (i64, PackageRecord)>,
    licenses: HashMap<i64, LicenseSummary>,
    checkpoints: HashMap<String, String>,
}

/// Connector whose stores all see the same in-memory tables
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored row id and record for `path`
    pub fn package(&self, path: &str) -> Option<(i64, PackageRecord)> {
        self.state().packages.get(path).cloned()
    }

    pub fn licenses(&self, id: i64) -> Option<LicenseSummary> {
        self.state().licenses.get(&id).cloned()
    }

    pub fn checkpoint(&self, key: &str) -> Option<String> {
        self.state().checkpoints.get(key).cloned()
    }

    pub fn package_count(&self) -> usize {
        self.state().packages.len()
    }

    pub fn license_row_count(&self) -> usize {
        self.state().licenses.len()
    }

    /// Pretend `record` was persisted by an earlier run
    pub fn seed(&self, record: PackageRecord) -> i64 {
        upsert(&mut self.state(), record)
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn MetadataStore>, StoreError> {
        Ok(Box::new(MemoryStore {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Store handle over the shared in-memory tables
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn upsert(state: &mut MemoryState, record: PackageRecord) -> i64 {
    if let Some((id, existing)) = state.packages.get_mut(&record.path) {
        *existing = record;
        return *id;
    }
    state.next_id += 1;
    let id = state.next_id;
    state.packages.insert(record.path.clone(), (id, record));
    id
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn stored_version(&mut self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .state()
            .packages
            .get(path)
            .map(|(_, record)| record.version.clone()))
    }

    async fn upsert_package(&mut self, record: &PackageRecord) -> Result<i64, StoreError> {
        Ok(upsert(&mut self.state(), record.clone()))
    }

    async fn upsert_licenses(
        &mut self,
        id: i64,
        licenses: &LicenseSummary,
    ) -> Result<(), StoreError> {
        self.state().licenses.insert(id, licenses.clone());
        Ok(())
    }

    async fn read_checkpoint(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state().checkpoints.get(key).cloned())
    }

    async fn write_checkpoint(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state()
            .checkpoints
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
