//! Feed cursor persistence
//!
//! The cursor is a single RFC3339 timestamp stored under the `since` key. It
//! only moves forward: [`Checkpoint::advance`] ignores timestamps at or before
//! the current cursor.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::MetadataStore;

/// Checkpoint table key holding the feed cursor
pub const CHECKPOINT_KEY: &str = "since";

/// Owner of the feed cursor and the store handle used to persist it
pub struct Checkpoint {
    store: Box<dyn MetadataStore>,
    cursor: DateTime<Utc>,
    write_failures: u64,
}

impl Checkpoint {
    /// Load the persisted cursor, starting from the epoch when none is usable
    pub async fn load(mut store: Box<dyn MetadataStore>) -> Self {
        let cursor = match store.read_checkpoint(CHECKPOINT_KEY).await {
            Ok(Some(value)) => match DateTime::parse_from_rfc3339(&value) {
                Ok(ts) => {
                    info!(since = %value, "Resuming from checkpoint");
                    ts.with_timezone(&Utc)
                }
                Err(e) => {
                    warn!(value = %value, error = %e, "Unparseable checkpoint, starting from the beginning");
                    DateTime::UNIX_EPOCH
                }
            },
            Ok(None) => {
                info!("No checkpoint stored, starting from the beginning");
                DateTime::UNIX_EPOCH
            }
            Err(e) => {
                warn!(error = %e, "Failed to read checkpoint, starting from the beginning");
                DateTime::UNIX_EPOCH
            }
        };

        Self {
            store,
            cursor,
            write_failures: 0,
        }
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// Move the cursor to `to` if it is later, and persist it
    ///
    /// Persisting is best-effort: a failed write is logged and counted, and
    /// the in-memory cursor still advances. Returns whether the cursor moved.
    pub async fn advance(&mut self, to: DateTime<Utc>) -> bool {
        if to <= self.cursor {
            return false;
        }
        self.cursor = to;

        if let Err(e) = self.persist().await {
            self.write_failures += 1;
            warn!(since = %format_cursor(self.cursor), error = %e, "Failed to persist checkpoint");
        }
        true
    }

    async fn persist(&mut self) -> Result<(), StoreError> {
        self.store
            .write_checkpoint(CHECKPOINT_KEY, &format_cursor(self.cursor))
            .await
    }
}

/// RFC3339 in UTC, keeping sub-second precision when present
pub fn format_cursor(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
