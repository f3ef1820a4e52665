//! Durable storage for plugdex: the scan journal and the plug-in catalog.
//!
//! Both stores are single SQLite files. The journal
//! ([`journal::ScanJournal`]) is the crash ledger of one scan in flight;
//! the catalog ([`catalog::Catalog`]) holds committed [`PluginRecord`]s
//! across scans. The orchestrator owns both files; workers only ever write
//! individual journal rows.
//!
//! [`PluginRecord`]: plugdex_core::PluginRecord

pub mod catalog;
pub mod journal;

pub use catalog::{Catalog, CatalogStats};
pub use journal::{JournalEntry, ScanJournal, ScanStatus, StatusCounts};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite error
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record blob could not be (de)serialized
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The catalog was written by an incompatible plugdex version
    #[error("catalog version {found} is not supported (expected {expected}); refusing to open")]
    Version { found: String, expected: String },

    /// A journal row carries a status string this build does not know
    #[error("unknown scan status: {0}")]
    Status(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Wall-clock seconds since the Unix epoch, as stored in REAL columns.
pub(crate) fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
