//! Run summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::checkpoint::format_cursor;
use crate::framework::StageReport;

/// Counters for one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Feed pages fetched
    pub batches: u64,
    /// Feed entries enqueued for resolution, duplicates included
    pub discovered: u64,
    /// Paths dropped because they were already admitted this run
    pub duplicates: u64,
    /// Feed lines that failed to decode
    pub malformed_lines: u64,
    pub checkpoint_failures: u64,
    /// Modules written to the store
    pub persisted: u64,
    pub resolve: StageReport,
    pub extract: StageReport,
    pub final_cursor: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            resolve: StageReport::new("resolve"),
            extract: StageReport::new("extract"),
            ..Default::default()
        }
    }

    /// Mark the run as finished
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            self.duration_secs = (end - start).num_milliseconds() as f64 / 1000.0;
        }
    }

    pub fn log_summary(&self) {
        info!(
            batches = self.batches,
            discovered = self.discovered,
            duplicates = self.duplicates,
            malformed_lines = self.malformed_lines,
            up_to_date = self.resolve.skipped,
            resolve_failed = self.resolve.failed,
            persisted = self.persisted,
            extract_failed = self.extract.failed,
            checkpoint_failures = self.checkpoint_failures,
            cursor = %self.final_cursor.map(format_cursor).unwrap_or_default(),
            duration_secs = self.duration_secs,
            "Scan finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_sets_duration() {
        let mut stats = RunStats::new();
        assert!(stats.completed_at.is_none());
        stats.complete();
        assert!(stats.completed_at.is_some());
        assert!(stats.duration_secs >= 0.0);
        assert_eq!(stats.resolve.stage, "resolve");
    }
}
