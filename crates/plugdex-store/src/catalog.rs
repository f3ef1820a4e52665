//! The plug-in catalog: durable, indexed, searchable storage of committed
//! [`PluginRecord`]s.
//!
//! The stored record is the serde-serialized form in the `data` column;
//! the remaining columns exist for indexing and are never read back into
//! records. A `cache_meta` table carries the schema version, and opening a
//! catalog written by an unknown version is refused rather than repaired.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};

use plugdex_core::{PluginRecord, PluginType};

use crate::{Result, StoreError, now_secs};

/// Version stamp written to `cache_meta`; bump on schema changes.
pub const CACHE_VERSION: &str = "2.0.0";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS plugins (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    path            TEXT NOT NULL UNIQUE,
    plugin_type     TEXT NOT NULL,
    manufacturer    TEXT,
    parameter_count INTEGER NOT NULL,
    data            TEXT NOT NULL,
    file_mtime      REAL NOT NULL,
    created_at      REAL NOT NULL,
    updated_at      REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_plugins_name ON plugins(name);
CREATE INDEX IF NOT EXISTS idx_plugins_type ON plugins(plugin_type);
CREATE INDEX IF NOT EXISTS idx_plugins_manufacturer ON plugins(manufacturer);
CREATE INDEX IF NOT EXISTS idx_plugins_path ON plugins(path);
CREATE INDEX IF NOT EXISTS idx_plugins_mtime ON plugins(file_mtime);

CREATE VIRTUAL TABLE IF NOT EXISTS plugins_fts USING fts5(
    id UNINDEXED,
    name,
    manufacturer,
    content='plugins',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS plugins_fts_insert AFTER INSERT ON plugins
BEGIN
    INSERT INTO plugins_fts(rowid, id, name, manufacturer)
    VALUES (new.rowid, new.id, new.name, new.manufacturer);
END;

CREATE TRIGGER IF NOT EXISTS plugins_fts_delete AFTER DELETE ON plugins
BEGIN
    INSERT INTO plugins_fts(plugins_fts, rowid, id, name, manufacturer)
    VALUES ('delete', old.rowid, old.id, old.name, old.manufacturer);
END;

CREATE TRIGGER IF NOT EXISTS plugins_fts_update AFTER UPDATE ON plugins
BEGIN
    INSERT INTO plugins_fts(plugins_fts, rowid, id, name, manufacturer)
    VALUES ('delete', old.rowid, old.id, old.name, old.manufacturer);
    INSERT INTO plugins_fts(rowid, id, name, manufacturer)
    VALUES (new.rowid, new.id, new.name, new.manufacturer);
END;

CREATE TABLE IF NOT EXISTS cache_meta (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at REAL NOT NULL
);
";

/// Catalog statistics for the `info` surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogStats {
    pub total: u64,
    /// Record count per plug-in type string
    pub by_type: BTreeMap<String, u64>,
    pub with_manufacturer: u64,
    pub db_size_bytes: u64,
}

/// Handle to the catalog database
pub struct Catalog {
    path: PathBuf,
    conn: Connection,
}

impl Catalog {
    /// Open (creating if needed) the catalog at `path`.
    ///
    /// An existing catalog is opened without issuing any write, so a
    /// write-protected file still opens for reading; writes surface
    /// `SQLITE_READONLY` at the call that attempts them.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let initialized: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'plugins'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if initialized.is_none() {
            conn.execute_batch(SCHEMA)?;
        }

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match version {
            Some(v) if v == CACHE_VERSION => {}
            Some(v) => {
                return Err(StoreError::Version {
                    found: v,
                    expected: CACHE_VERSION.to_string(),
                });
            }
            None => {
                conn.execute(
                    "INSERT INTO cache_meta (key, value, updated_at) VALUES ('version', ?1, ?2)",
                    params![CACHE_VERSION, now_secs()],
                )?;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All committed records, keyed by catalog id.
    pub fn load_all(&self) -> Result<BTreeMap<String, PluginRecord>> {
        let mut stmt = self.conn.prepare("SELECT id, data FROM plugins")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;

        let mut records = BTreeMap::new();
        for (id, json) in rows {
            match serde_json::from_str::<PluginRecord>(&json) {
                Ok(record) => {
                    records.insert(id, record);
                }
                Err(e) => tracing::warn!("skipping corrupt catalog row {id}: {e}"),
            }
        }
        Ok(records)
    }

    /// The set of plug-in paths already cached. One indexed column scan,
    /// used by the orchestrator's diff step.
    pub fn known_paths(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM plugins")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(paths)
    }

    /// Insert or overwrite `records` in a single transaction.
    ///
    /// Either every record lands or none does; a failure here leaves the
    /// catalog exactly as it was.
    pub fn upsert_many(&mut self, records: &[PluginRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let now = now_secs();
        for record in records {
            let json = serde_json::to_string(record)?;
            let created_at: Option<f64> = tx
                .query_row(
                    "SELECT created_at FROM plugins WHERE id = ?1",
                    params![record.id],
                    |row| row.get(0),
                )
                .optional()?;
            // A record may collide on id (rescan) or on path (renamed
            // stem); replace both before inserting.
            tx.execute(
                "DELETE FROM plugins WHERE id = ?1 OR path = ?2",
                params![record.id, record.path],
            )?;
            tx.execute(
                "INSERT INTO plugins (
                     id, name, path, plugin_type, manufacturer, parameter_count,
                     data, file_mtime, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.name,
                    record.path,
                    record.plugin_type.as_str(),
                    record.manufacturer,
                    record.parameters.len(),
                    json,
                    record.file_mtime,
                    created_at.unwrap_or(now),
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Remove one record; returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM plugins WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Remove every record.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM plugins", [])?;
        Ok(())
    }

    /// Ranked search over name and manufacturer.
    ///
    /// Tokens are matched as prefixes through the full-text index; when
    /// that finds nothing (or the query has no indexable token) a plain
    /// substring match is used instead.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<PluginRecord>> {
        if let Some(fts_query) = fts_match_expr(query) {
            let mut stmt = self.conn.prepare(
                "SELECT p.data FROM plugins p
                 JOIN plugins_fts f ON p.rowid = f.rowid
                 WHERE plugins_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![fts_query, limit], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            if !rows.is_empty() {
                return deserialize_rows(rows);
            }
        }

        let like = format!("%{query}%");
        let mut stmt = self.conn.prepare(
            "SELECT data FROM plugins
             WHERE name LIKE ?1 OR manufacturer LIKE ?1
             ORDER BY name
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![like, limit], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        deserialize_rows(rows)
    }

    /// All records of one plug-in type, ordered by name.
    pub fn filter_by_type(&self, plugin_type: PluginType) -> Result<Vec<PluginRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM plugins WHERE plugin_type = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![plugin_type.as_str()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        deserialize_rows(rows)
    }

    /// Catalog statistics.
    pub fn stats(&self) -> Result<CatalogStats> {
        let total: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM plugins", [], |row| row.get(0))?;

        let mut stmt = self
            .conn
            .prepare("SELECT plugin_type, COUNT(*) FROM plugins GROUP BY plugin_type")?;
        let by_type = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?
            .collect::<rusqlite::Result<BTreeMap<String, u64>>>()?;

        let with_manufacturer: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM plugins WHERE manufacturer IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let db_size_bytes: u64 = self.conn.query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )?;

        Ok(CatalogStats {
            total,
            by_type,
            with_manufacturer,
            db_size_bytes,
        })
    }
}

fn deserialize_rows(rows: Vec<String>) -> Result<Vec<PluginRecord>> {
    let mut records = Vec::with_capacity(rows.len());
    for json in rows {
        match serde_json::from_str::<PluginRecord>(&json) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("skipping corrupt catalog row: {e}"),
        }
    }
    Ok(records)
}

/// Build an FTS5 match expression of quoted prefix tokens, or `None` when
/// the query contains nothing indexable.
fn fts_match_expr(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\"*"))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugdex_core::{ParamValue, PluginParameter};
    use rusqlite::Connection;

    fn record(id: &str, name: &str, path: &str, manufacturer: Option<&str>) -> PluginRecord {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "gain".to_string(),
            PluginParameter {
                name: "gain".to_string(),
                value: ParamValue::Float(0.5),
            },
        );
        PluginRecord {
            id: id.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            filename: Path::new(path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string(),
            plugin_type: PluginType::Vst3,
            manufacturer: manufacturer.map(String::from),
            parameters,
            file_mtime: 1_700_000_000.0,
        }
    }

    #[test]
    fn test_upsert_and_load_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("plugins.db")).unwrap();

        let a = record("vst3/a", "A", "/p/a.vst3", Some("Acme"));
        let b = record("vst3/b", "B", "/p/b.vst3", None);
        catalog.upsert_many(&[a.clone(), b.clone()]).unwrap();

        let all = catalog.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["vst3/a"], a);
        assert_eq!(all["vst3/b"], b);
    }

    #[test]
    fn test_upsert_overwrites_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("plugins.db")).unwrap();

        catalog
            .upsert_many(&[record("vst3/a", "A", "/p/a.vst3", None)])
            .unwrap();
        catalog
            .upsert_many(&[record("vst3/a", "A (new)", "/p/a.vst3", Some("Acme"))])
            .unwrap();

        let all = catalog.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["vst3/a"].name, "A (new)");
    }

    #[test]
    fn test_known_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("plugins.db")).unwrap();
        catalog
            .upsert_many(&[
                record("vst3/a", "A", "/p/a.vst3", None),
                record("vst3/b", "B", "/p/b.vst3", None),
            ])
            .unwrap();

        let paths = catalog.known_paths().unwrap();
        assert!(paths.contains("/p/a.vst3"));
        assert!(paths.contains("/p/b.vst3"));
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_search_by_name_and_vendor() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("plugins.db")).unwrap();
        catalog
            .upsert_many(&[
                record("vst3/ProQ", "Pro-Q 3", "/p/ProQ.vst3", Some("FabFilter")),
                record("vst3/Gain", "Simple Gain", "/p/Gain.vst3", Some("Acme")),
            ])
            .unwrap();

        let hits = catalog.search("fabfilter", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "vst3/ProQ");

        // Substring fallback for mid-word fragments the tokenizer misses
        let hits = catalog.search("impl", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "vst3/Gain");
    }

    #[test]
    fn test_filter_by_type_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("plugins.db")).unwrap();
        let mut au = record("aufx/EQ", "Channel EQ", "/p/EQ.component", Some("Apple"));
        au.plugin_type = PluginType::Aufx;
        catalog
            .upsert_many(&[record("vst3/a", "A", "/p/a.vst3", None), au])
            .unwrap();

        let vst3 = catalog.filter_by_type(PluginType::Vst3).unwrap();
        assert_eq!(vst3.len(), 1);

        let stats = catalog.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_type.get("vst3"), Some(&1));
        assert_eq!(stats.by_type.get("aufx"), Some(&1));
        assert_eq!(stats.with_manufacturer, 1);
        assert!(stats.db_size_bytes > 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("plugins.db")).unwrap();
        catalog
            .upsert_many(&[
                record("vst3/a", "A", "/p/a.vst3", None),
                record("vst3/b", "B", "/p/b.vst3", None),
            ])
            .unwrap();

        assert!(catalog.delete("vst3/a").unwrap());
        assert!(!catalog.delete("vst3/a").unwrap());
        catalog.clear().unwrap();
        assert_eq!(catalog.stats().unwrap().total, 0);
    }

    #[test]
    fn test_unknown_version_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.db");
        drop(Catalog::open(&path).unwrap());

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE cache_meta SET value = '99.0.0' WHERE key = 'version'",
            [],
        )
        .unwrap();
        drop(conn);

        let err = Catalog::open(&path).err().expect("open must be refused");
        match err {
            StoreError::Version { found, .. } => assert_eq!(found, "99.0.0"),
            other => panic!("expected version error, got {other}"),
        }
        // The database must be untouched by the refused open
        let conn = Connection::open(&path).unwrap();
        let v: String = conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(v, "99.0.0");
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.db");
        {
            let mut catalog = Catalog::open(&path).unwrap();
            catalog
                .upsert_many(&[record("vst3/a", "A", "/p/a.vst3", None)])
                .unwrap();
        }
        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.load_all().unwrap().len(), 1);
    }
}
