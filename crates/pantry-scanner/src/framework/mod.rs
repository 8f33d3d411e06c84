//! Staged worker framework
//!
//! Named stages with a configurable worker count and a bounded input queue,
//! started together by the orchestrator and stopped by closing their queues.

pub mod stage;

pub use stage::{StageConfig, StageOutcome, StagePool, StageReport, StageWorker};
