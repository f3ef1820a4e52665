//! The scan journal: a durable per-row ledger of one scan's progress.
//!
//! Rows are keyed by the candidate's file path (the only stable handle
//! before a plug-in has been loaded) and move through the status machine
//! `pending -> scanning -> success | failed | timeout`. Worker processes
//! write their own rows concurrently; WAL mode with a busy timeout
//! serializes the writers. Terminal rows only leave the ledger when the
//! whole file is dropped after a successful catalog commit.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};

use plugdex_core::PluginRecord;

use crate::{Result, StoreError, now_secs};

/// Per-row scan state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanStatus {
    /// Planned, not yet handed to a worker
    Pending,
    /// A worker has been dispatched for this row
    Scanning,
    /// Worker finished and wrote a serialized record
    Success,
    /// Loader raised, worker died, or the subprocess exited non-zero
    Failed,
    /// Worker exceeded the deadline and was killed
    Timeout,
}

impl ScanStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    /// Whether this status ends a row's life in the state machine.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "scanning" => Ok(Self::Scanning),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            other => Err(StoreError::Status(other.to_string())),
        }
    }
}

/// One journal row
#[derive(Debug, Clone)]
pub struct JournalEntry {
    /// Candidate file path (journal key)
    pub plugin_id: String,
    pub status: ScanStatus,
    /// Serialized record on success, error description on failed/timeout
    pub result: Option<String>,
    /// Seconds since epoch of the last status transition
    pub timestamp: Option<f64>,
}

/// Row counts per status, as reported in the end-of-scan summary.
pub type StatusCounts = BTreeMap<ScanStatus, u64>;

/// Handle to the journal database.
///
/// Every process of a scan opens its own handle; cross-process writes
/// serialize through SQLite's WAL locking.
pub struct ScanJournal {
    path: PathBuf,
    conn: Connection,
}

impl ScanJournal {
    /// Open (creating if needed) the journal at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // WAL + NORMAL: short write transactions from many processes must
        // survive a hard kill at any instruction boundary.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS journal (
                 plugin_id TEXT PRIMARY KEY,
                 status    TEXT NOT NULL,
                 result    TEXT,
                 timestamp REAL
             );
             CREATE INDEX IF NOT EXISTS idx_journal_status ON journal (status);",
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert each id with `pending` status; rows that already exist are
    /// left untouched. Returns the number of rows actually inserted.
    pub fn add_pending<I, S>(&mut self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO journal (plugin_id, status) VALUES (?1, 'pending')",
            )?;
            for id in ids {
                inserted += stmt.execute(params![id.as_ref()])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// All plugin ids currently in `status`.
    pub fn get_by_status(&self, status: ScanStatus) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT plugin_id FROM journal WHERE status = ?1")?;
        let ids = stmt
            .query_map(params![status.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Transition one row. The write is committed (and, under WAL/NORMAL,
    /// durable against process death) before this returns.
    pub fn update(&self, plugin_id: &str, status: ScanStatus, result: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE journal SET status = ?1, result = ?2, timestamp = ?3 WHERE plugin_id = ?4",
            params![status.as_str(), result, now_secs(), plugin_id],
        )?;
        Ok(())
    }

    /// Write a successful scan result for `plugin_id`.
    pub fn record_success(&self, plugin_id: &str, record: &PluginRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.update(plugin_id, ScanStatus::Success, Some(&json))
    }

    /// Fetch a single row, if present.
    pub fn entry(&self, plugin_id: &str) -> Result<Option<JournalEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT plugin_id, status, result, timestamp FROM journal WHERE plugin_id = ?1",
                params![plugin_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(plugin_id, status, result, timestamp)| {
            Ok(JournalEntry {
                plugin_id,
                status: status.parse()?,
                result,
                timestamp,
            })
        })
        .transpose()
    }

    /// All successful rows, with their records deserialized.
    ///
    /// Rows whose payload no longer parses are skipped with a warning
    /// rather than failing the commit of every other plug-in.
    pub fn successes(&self) -> Result<Vec<(String, PluginRecord)>> {
        let mut stmt = self.conn.prepare(
            "SELECT plugin_id, result FROM journal
             WHERE status = 'success' AND result IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (plugin_id, json) in rows {
            match serde_json::from_str::<PluginRecord>(&json) {
                Ok(record) => entries.push((plugin_id, record)),
                Err(e) => {
                    tracing::warn!("skipping corrupt journal payload for {plugin_id}: {e}");
                }
            }
        }
        Ok(entries)
    }

    /// Row counts per status.
    pub fn summary(&self) -> Result<StatusCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM journal GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<(String, u64)>>>()?;

        let mut counts = StatusCounts::new();
        for (status, count) in rows {
            counts.insert(status.parse()?, count);
        }
        Ok(counts)
    }

    /// Delete the journal from disk, consuming the handle.
    ///
    /// Removes the WAL side files as well so no stale state signals a
    /// resume on the next startup.
    pub fn drop_journal(self) -> Result<()> {
        let path = self.path;
        drop(self.conn);
        remove_journal_files(&path)
    }
}

/// Remove a journal database and its WAL/SHM side files if present.
pub fn remove_journal_files(path: &Path) -> Result<()> {
    for candidate in [
        path.to_path_buf(),
        PathBuf::from(format!("{}-wal", path.display())),
        PathBuf::from(format!("{}-shm", path.display())),
    ] {
        match std::fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugdex_core::PluginType;
    use std::collections::BTreeMap;

    fn test_record(path: &str) -> PluginRecord {
        let path = PathBuf::from(path);
        PluginRecord {
            id: PluginRecord::id_for(PluginType::Vst3, &path),
            name: plugdex_core::model::file_stem(&path),
            path: path.display().to_string(),
            filename: path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_default(),
            plugin_type: PluginType::Vst3,
            manufacturer: None,
            parameters: BTreeMap::new(),
            file_mtime: 0.0,
        }
    }

    #[test]
    fn test_add_pending_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = ScanJournal::open(&dir.path().join("journal.db")).unwrap();

        let inserted = journal.add_pending(["/p/a.vst3", "/p/b.vst3"]).unwrap();
        assert_eq!(inserted, 2);

        // Re-adding must not clobber existing rows
        journal.update("/p/a.vst3", ScanStatus::Success, None).unwrap();
        let inserted = journal.add_pending(["/p/a.vst3", "/p/b.vst3"]).unwrap();
        assert_eq!(inserted, 0);

        let pending = journal.get_by_status(ScanStatus::Pending).unwrap();
        assert_eq!(pending, vec!["/p/b.vst3".to_string()]);
    }

    #[test]
    fn test_update_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = ScanJournal::open(&dir.path().join("journal.db")).unwrap();
        journal.add_pending(["/p/a.vst3"]).unwrap();

        journal
            .update("/p/a.vst3", ScanStatus::Failed, Some("loader raised: boom"))
            .unwrap();

        let entry = journal.entry("/p/a.vst3").unwrap().unwrap();
        assert_eq!(entry.status, ScanStatus::Failed);
        assert_eq!(entry.result.as_deref(), Some("loader raised: boom"));
        assert!(entry.timestamp.unwrap() > 0.0);
    }

    #[test]
    fn test_success_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = ScanJournal::open(&dir.path().join("journal.db")).unwrap();
        journal.add_pending(["/p/a.vst3"]).unwrap();

        let record = test_record("/p/a.vst3");
        journal.record_success("/p/a.vst3", &record).unwrap();

        let successes = journal.successes().unwrap();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].0, "/p/a.vst3");
        assert_eq!(successes[0].1, record);
    }

    #[test]
    fn test_summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = ScanJournal::open(&dir.path().join("journal.db")).unwrap();
        journal
            .add_pending(["/p/a.vst3", "/p/b.vst3", "/p/c.vst3"])
            .unwrap();
        journal.update("/p/a.vst3", ScanStatus::Success, Some("{}")).unwrap();
        journal.update("/p/b.vst3", ScanStatus::Timeout, Some("deadline")).unwrap();

        let counts = journal.summary().unwrap();
        assert_eq!(counts.get(&ScanStatus::Success), Some(&1));
        assert_eq!(counts.get(&ScanStatus::Timeout), Some(&1));
        assert_eq!(counts.get(&ScanStatus::Pending), Some(&1));
    }

    #[test]
    fn test_writes_visible_to_second_handle() {
        // A worker's committed write must be observable by the
        // orchestrator's own handle on the same file.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let mut writer = ScanJournal::open(&path).unwrap();
        writer.add_pending(["/p/a.vst3"]).unwrap();
        writer.update("/p/a.vst3", ScanStatus::Scanning, None).unwrap();

        let reader = ScanJournal::open(&path).unwrap();
        let entry = reader.entry("/p/a.vst3").unwrap().unwrap();
        assert_eq!(entry.status, ScanStatus::Scanning);
    }

    #[test]
    fn test_drop_removes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let mut journal = ScanJournal::open(&path).unwrap();
        journal.add_pending(["/p/a.vst3"]).unwrap();

        journal.drop_journal().unwrap();
        assert!(!path.exists());
        assert!(!dir.path().join("journal.db-wal").exists());
    }
}
