//! Bounded worker pool.
//!
//! A fixed set of supervisor threads pulls candidates off a channel; each
//! supervisor runs one `plugdex-worker` subprocess at a time, polls it
//! against the scan deadline, and reconciles the journal row for every way
//! a worker can end: clean exit, dirty exit, signal death, or a kill after
//! the deadline. Rows never remain in `scanning` once the pool drains.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use plugdex_core::CandidatePlugin;
use plugdex_loader::LOADER_ENV;
use plugdex_store::{ScanJournal, ScanStatus};

use crate::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const STDERR_TAIL_CHARS: usize = 512;

/// Everything a supervisor thread needs to run workers
pub struct PoolConfig {
    pub worker_bin: PathBuf,
    pub journal_path: PathBuf,
    pub timeout: Duration,
    pub workers: usize,
    /// Forwarded to workers as `PLUGDEX_LOADER`
    pub loader_override: Option<String>,
}

/// Run every task to a terminal journal state.
///
/// When `cancel` is raised, queued tasks are left untouched (their rows
/// stay `pending` for a future resume); tasks already being supervised run
/// to their own completion or deadline.
pub fn run_pool(
    config: &PoolConfig,
    tasks: Vec<CandidatePlugin>,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }
    let thread_count = config.workers.min(tasks.len()).max(1);
    let (tx, rx) = crossbeam_channel::unbounded::<CandidatePlugin>();
    for task in tasks {
        // Unbounded send to an open channel cannot fail
        let _ = tx.send(task);
    }
    drop(tx);

    std::thread::scope(|scope| {
        for _ in 0..thread_count {
            let rx = rx.clone();
            scope.spawn(move || {
                let journal = match ScanJournal::open(&config.journal_path) {
                    Ok(journal) => journal,
                    Err(e) => {
                        tracing::error!("supervisor cannot open journal: {e}");
                        return;
                    }
                };
                while let Ok(task) = rx.recv() {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    supervise_one(config, &journal, &task);
                }
            });
        }
    });
    Ok(())
}

/// Drive one worker subprocess to a terminal journal row.
///
/// Per-plug-in problems are recorded in the row, never propagated: one bad
/// plug-in must not abort the scan.
fn supervise_one(config: &PoolConfig, journal: &ScanJournal, task: &CandidatePlugin) {
    let plugin_id = task.path.display().to_string();

    // Mark the row before the subprocess exists, so a worker that dies
    // before its own first journal write still gets reconciled below.
    if let Err(e) = journal.update(&plugin_id, ScanStatus::Scanning, None) {
        tracing::error!("cannot mark {plugin_id} as scanning: {e}");
        return;
    }

    let mut command = Command::new(&config.worker_bin);
    command
        .arg("--plugin-path")
        .arg(&task.path)
        .arg("--plugin-name")
        .arg(&task.name)
        .arg("--plugin-type")
        .arg(task.plugin_type.as_str())
        .arg("--journal-path")
        .arg(&config.journal_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    if let Some(loader) = &config.loader_override {
        command.env(LOADER_ENV, loader);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            record(journal, &plugin_id, ScanStatus::Failed, &format!("spawn failed: {e}"));
            return;
        }
    };

    tracing::debug!("scanning {plugin_id} (pid {})", child.id());
    let deadline = Instant::now() + config.timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stderr_tail = read_stderr_tail(&mut child);
                if status.success() {
                    reconcile_clean_exit(journal, &plugin_id);
                } else {
                    reconcile_dirty_exit(journal, &plugin_id, &status.to_string(), &stderr_tail);
                }
                return;
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    record(
                        journal,
                        &plugin_id,
                        ScanStatus::Timeout,
                        &format!("deadline of {:?} exceeded", config.timeout),
                    );
                    return;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                record(journal, &plugin_id, ScanStatus::Failed, &format!("wait failed: {e}"));
                return;
            }
        }
    }
}

/// Worker exited 0: its own terminal write is authoritative. A zero exit
/// with no terminal row means the worker broke its contract.
fn reconcile_clean_exit(journal: &ScanJournal, plugin_id: &str) {
    match journal.entry(plugin_id) {
        Ok(Some(entry)) if entry.status.is_terminal() => {}
        Ok(_) => record(
            journal,
            plugin_id,
            ScanStatus::Failed,
            "worker exited without writing a result",
        ),
        Err(e) => tracing::error!("cannot read journal row for {plugin_id}: {e}"),
    }
}

/// Worker exited non-zero or died to a signal: keep a terminal row the
/// worker managed to write, otherwise record the crash.
fn reconcile_dirty_exit(journal: &ScanJournal, plugin_id: &str, status: &str, stderr_tail: &str) {
    match journal.entry(plugin_id) {
        Ok(Some(entry)) if entry.status.is_terminal() => {}
        Ok(_) => {
            let message = if stderr_tail.is_empty() {
                format!("worker died: {status}")
            } else {
                format!("worker died: {status}: {stderr_tail}")
            };
            record(journal, plugin_id, ScanStatus::Failed, &message);
        }
        Err(e) => tracing::error!("cannot read journal row for {plugin_id}: {e}"),
    }
}

fn record(journal: &ScanJournal, plugin_id: &str, status: ScanStatus, message: &str) {
    tracing::debug!("{plugin_id}: {status}: {message}");
    if let Err(e) = journal.update(plugin_id, status, Some(message)) {
        tracing::error!("cannot record {status} for {plugin_id}: {e}");
    }
}

fn read_stderr_tail(child: &mut Child) -> String {
    let mut output = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut output);
    }
    let output = output.trim();
    if output.len() > STDERR_TAIL_CHARS {
        let cut = output.len() - STDERR_TAIL_CHARS;
        // Cut on a char boundary at or after the byte offset
        output
            .char_indices()
            .find(|(i, _)| *i >= cut)
            .map_or_else(String::new, |(i, _)| output[i..].to_string())
    } else {
        output.to_string()
    }
}
