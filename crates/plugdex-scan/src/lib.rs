//! Scan orchestration: the journaled, process-isolated scheduler.
//!
//! A scan plans candidates from the probe, dispatches one short-lived
//! worker subprocess per plug-in through a bounded pool, records every
//! outcome in the journal, and finally promotes the successes into the
//! catalog in a single transaction. Any process in the fleet, worker or
//! orchestrator, may die at any instruction without losing the work that
//! already reached the journal.

pub mod orchestrator;
pub mod pool;
pub mod worker;

use std::path::PathBuf;

pub use orchestrator::{Orchestrator, ScanConfig, ScanSummary, resolve_worker_bin};
pub use pool::{PoolConfig, run_pool};

/// Scan errors
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Core(#[from] plugdex_core::Error),

    #[error(transparent)]
    Probe(#[from] plugdex_probe::ProbeError),

    #[error(transparent)]
    Store(#[from] plugdex_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The commit transaction failed; the journal survives verbatim and
    /// the next scan will retry the commit.
    #[error("commit failed ({source}); journal preserved at {}", .journal.display())]
    CommitFailed {
        journal: PathBuf,
        source: plugdex_store::StoreError,
    },

    #[error("worker binary not found: {0}")]
    WorkerBinary(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
