//! Stage worker pools
//!
//! A stage is a bounded FIFO queue drained by a fixed number of workers. Every
//! worker is long-lived and owns its resources (store connection, clients), so
//! nothing is shared across workers except the queue itself. Producers block on
//! a full queue, which throttles upstream stages to the slowest consumer.
//!
//! A stage stops on its own once every sender of its queue is dropped and the
//! queue is empty: workers finish their in-flight item, see the closed queue
//! and exit. That is the only shutdown path; items are never cancelled
//! mid-flight.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::ScannerError;

/// Result of one item passing through a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The item was handled and forwarded or persisted
    Completed,
    /// Nothing to do for this item
    Skipped(String),
    /// The item failed; the failure is confined to this item
    Failed(String),
}

impl StageOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped(reason.into())
    }

    pub fn failed(reason: impl std::fmt::Display) -> Self {
        StageOutcome::Failed(reason.to_string())
    }
}

/// Processes the items of one stage, one at a time
#[async_trait]
pub trait StageWorker<I>: Send + 'static
where
    I: Send + 'static,
{
    async fn process(&mut self, item: I) -> StageOutcome;
}

/// Worker count and queue size of a named stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl StageConfig {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Bounded input queue for this stage
    pub fn queue<I>(&self) -> (mpsc::Sender<I>, mpsc::Receiver<I>) {
        mpsc::channel(self.queue_capacity)
    }
}

/// Aggregated outcomes of a stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl StageReport {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &StageOutcome) {
        match outcome {
            StageOutcome::Completed => self.completed += 1,
            StageOutcome::Skipped(_) => self.skipped += 1,
            StageOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &StageReport) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> u64 {
        self.completed + self.skipped + self.failed
    }
}

/// Running workers of one stage
pub struct StagePool {
    name: &'static str,
    workers: JoinSet<StageReport>,
}

impl StagePool {
    /// Start one task per worker, all draining `input`
    pub fn spawn<I, W>(name: &'static str, input: mpsc::Receiver<I>, workers: Vec<W>) -> Self
    where
        I: Send + 'static,
        W: StageWorker<I>,
    {
        let input = Arc::new(Mutex::new(input));
        let mut set = JoinSet::new();

        for (index, worker) in workers.into_iter().enumerate() {
            set.spawn(drain(name, index, Arc::clone(&input), worker));
        }

        debug!(stage = name, workers = set.len(), "Stage started");

        Self { name, workers: set }
    }

    /// Wait until the queue is closed and every worker has exited
    pub async fn join(mut self) -> Result<StageReport, ScannerError> {
        let mut report = StageReport::new(self.name);
        let mut panic = None;

        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(worker_report) => report.merge(&worker_report),
                Err(e) => {
                    error!(stage = self.name, error = %e, "Stage worker died");
                    panic.get_or_insert_with(|| e.to_string());
                }
            }
        }

        match panic {
            Some(message) => Err(ScannerError::StagePanicked {
                stage: self.name.to_string(),
                message,
            }),
            None => Ok(report),
        }
    }
}

async fn drain<I, W>(
    name: &'static str,
    index: usize,
    input: Arc<Mutex<mpsc::Receiver<I>>>,
    mut worker: W,
) -> StageReport
where
    I: Send + 'static,
    W: StageWorker<I>,
{
    let mut report = StageReport::new(name);

    loop {
        // Lock only while waiting; processing happens outside the lock.
        let next = input.lock().await.recv().await;
        let Some(item) = next else { break };

        let outcome = worker.process(item).await;
        report.record(&outcome);
    }

    debug!(
        stage = name,
        worker = index,
        completed = report.completed,
        skipped = report.skipped,
        failed = report.failed,
        "Stage worker drained"
    );

    report
}
