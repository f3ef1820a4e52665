//! The scan orchestrator: plan, dispatch, supervise, commit.
//!
//! The journal is the single source of truth for a scan in flight. A scan
//! is a *resume* when the journal file already exists at startup; `rescan`
//! clears catalog and journal first. Successes are promoted into the
//! catalog in one transaction, and the journal is deleted only after that
//! transaction commits. A crash anywhere leaves either the pre-scan
//! catalog plus a recoverable journal, or the post-scan catalog and no
//! journal.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use plugdex_core::{CandidatePlugin, paths};
use plugdex_probe::{IgnoreSet, Probe};
use plugdex_store::{Catalog, ScanJournal, StatusCounts, journal};

use crate::pool::{self, PoolConfig};
use crate::{Result, ScanError};

/// Scan settings, all overridable from the CLI
pub struct ScanConfig {
    /// Directory holding catalog, journal and ignore file
    pub data_dir: PathBuf,
    /// Worker pool size
    pub workers: usize,
    /// Per-plug-in wall-clock deadline
    pub timeout: Duration,
    /// Extra VST3 folders besides the platform defaults
    pub extra_folders: Vec<PathBuf>,
    /// Search the platform-standard folders (disabled by some tests and
    /// by `scan-one`)
    pub standard_folders: bool,
    /// Clear catalog and journal before scanning
    pub rescan: bool,
    /// Explicit worker binary; default is `PLUGDEX_WORKER_BIN` or the
    /// `plugdex-worker` next to the current executable
    pub worker_bin: Option<PathBuf>,
    /// Forwarded to workers as `PLUGDEX_LOADER`
    pub loader_override: Option<String>,
}

impl ScanConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            workers: num_cpus::get().min(8),
            timeout: Duration::from_secs(30),
            extra_folders: Vec::new(),
            standard_folders: true,
            rescan: false,
            worker_bin: None,
            loader_override: None,
        }
    }
}

/// What a finished (or stopped) scan reports back
#[derive(Debug)]
pub struct ScanSummary {
    /// Candidates handed to the worker pool this run
    pub dispatched: usize,
    /// Journal row counts per status, taken just before commit
    pub counts: StatusCounts,
    /// Records promoted into the catalog
    pub committed: usize,
    /// Set when the journal survives (cancellation; commit failure is an
    /// error instead)
    pub journal_preserved: Option<PathBuf>,
    pub cancelled: bool,
    pub catalog_path: PathBuf,
}

/// Environment variable naming the worker binary
pub const WORKER_BIN_ENV: &str = "PLUGDEX_WORKER_BIN";

pub struct Orchestrator {
    config: ScanConfig,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops dispatching when raised. Running workers finish (or
    /// hit their deadline); the journal is preserved and nothing commits.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run one full scan.
    pub fn scan(&self) -> Result<ScanSummary> {
        let config = &self.config;
        paths::ensure_dir(&config.data_dir)?;
        let catalog_path = paths::catalog_path(&config.data_dir);
        let journal_path = paths::journal_path(&config.data_dir);
        let ignores_path = paths::ignores_path(&config.data_dir);

        // Step 1: plan.
        let mut catalog = Catalog::open(&catalog_path)?;
        if config.rescan {
            tracing::info!("rescan requested; clearing catalog and journal");
            catalog.clear()?;
            journal::remove_journal_files(&journal_path)?;
        } else if journal_path.exists() {
            tracing::info!("found journal at {}; resuming previous scan", journal_path.display());
        }

        let ignores = IgnoreSet::load_or_seed(&ignores_path)?;
        let probe = Probe::new(ignores)
            .with_standard_folders(config.standard_folders)
            .with_extra_folders(config.extra_folders.clone());
        let candidates = probe.candidates();

        let known = if config.rescan {
            HashSet::new()
        } else {
            catalog.known_paths()?
        };
        let new_candidates: Vec<CandidatePlugin> = candidates
            .into_iter()
            .filter(|c| !known.contains(&c.path.display().to_string()))
            .collect();

        let mut journal = ScanJournal::open(&journal_path)?;
        journal.add_pending(new_candidates.iter().map(|c| c.path.display().to_string()))?;

        // Step 2: dispatch set. Pending rows plus any `scanning` rows a
        // killed run left behind; both are (re)tried from scratch.
        let mut to_scan: HashSet<String> = journal
            .get_by_status(plugdex_store::ScanStatus::Pending)?
            .into_iter()
            .collect();
        to_scan.extend(journal.get_by_status(plugdex_store::ScanStatus::Scanning)?);

        let tasks: Vec<CandidatePlugin> = new_candidates
            .into_iter()
            .filter(|c| to_scan.contains(&c.path.display().to_string()))
            .collect();
        let dispatched = tasks.len();

        // Step 3: supervise the pool to a fully terminal journal.
        if dispatched > 0 {
            tracing::info!(
                "scanning {dispatched} plug-ins with {} workers, {:?} deadline",
                config.workers,
                config.timeout
            );
            let pool_config = PoolConfig {
                worker_bin: self.resolve_worker_bin()?,
                journal_path: journal_path.clone(),
                timeout: config.timeout,
                workers: config.workers,
                loader_override: config.loader_override.clone(),
            };
            pool::run_pool(&pool_config, tasks, &self.cancel)?;
        }

        let counts = journal.summary()?;

        if self.cancel.load(Ordering::SeqCst) {
            tracing::warn!("scan cancelled; journal preserved for resume");
            return Ok(ScanSummary {
                dispatched,
                counts,
                committed: 0,
                journal_preserved: Some(journal_path),
                cancelled: true,
                catalog_path,
            });
        }

        // Step 4: commit. The journal is dropped if and only if the
        // catalog transaction went through; an empty success set is still
        // a commit (and still drops a stale journal).
        let successes = journal.successes()?;
        let records: Vec<_> = successes.into_iter().map(|(_, record)| record).collect();
        match catalog.upsert_many(&records) {
            Ok(committed) => {
                journal.drop_journal()?;
                tracing::info!("committed {committed} records to {}", catalog_path.display());
                Ok(ScanSummary {
                    dispatched,
                    counts,
                    committed,
                    journal_preserved: None,
                    cancelled: false,
                    catalog_path,
                })
            }
            Err(source) => Err(ScanError::CommitFailed {
                journal: journal_path,
                source,
            }),
        }
    }

    fn resolve_worker_bin(&self) -> Result<PathBuf> {
        resolve_worker_bin(self.config.worker_bin.as_ref())
    }
}

/// Locate the `plugdex-worker` binary: explicit setting, then the
/// `PLUGDEX_WORKER_BIN` environment variable, then the sibling of the
/// current executable.
pub fn resolve_worker_bin(explicit: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(bin) = explicit {
        return Ok(bin.clone());
    }
    if let Some(bin) = std::env::var_os(WORKER_BIN_ENV) {
        return Ok(PathBuf::from(bin));
    }
    let exe = std::env::current_exe()?;
    let sibling = exe
        .parent()
        .map(|dir| dir.join(format!("plugdex-worker{}", std::env::consts::EXE_SUFFIX)));
    match sibling {
        Some(bin) if bin.exists() => Ok(bin),
        _ => Err(ScanError::WorkerBinary(format!(
            "no plugdex-worker next to {} and {WORKER_BIN_ENV} is unset",
            exe.display()
        ))),
    }
}
