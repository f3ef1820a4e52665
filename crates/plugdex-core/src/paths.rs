//! Per-user file locations.
//!
//! All persistent state lives under one data directory: the catalog, the
//! scan journal and the ignore list. The directory can be overridden with
//! `PLUGDEX_DATA_DIR`, which is also how the test suites point every
//! process of a scan (orchestrator and workers) at a scratch location.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::Error;

/// Directory name under the platform data/cache root
pub const APP_DIR_NAME: &str = "plugdex";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "PLUGDEX_DATA_DIR";

pub const CATALOG_FILENAME: &str = "plugins.db";
pub const JOURNAL_FILENAME: &str = "scan_journal.db";
pub const IGNORES_FILENAME: &str = "ignores.json";

/// Resolve the plugdex data directory.
///
/// Honors `PLUGDEX_DATA_DIR` first. Otherwise uses the platform convention:
/// `~/Library/Application Support` on macOS, `%APPDATA%` on Windows and the
/// XDG cache directory (`~/.cache`) elsewhere.
pub fn data_dir() -> Result<PathBuf, Error> {
    resolve(std::env::var_os(DATA_DIR_ENV))
}

fn resolve(override_dir: Option<OsString>) -> Result<PathBuf, Error> {
    if let Some(dir) = override_dir {
        return Ok(PathBuf::from(dir));
    }

    let base = if cfg!(any(target_os = "macos", target_os = "windows")) {
        dirs_next::data_dir()
    } else {
        dirs_next::cache_dir()
    };

    base.map(|b| b.join(APP_DIR_NAME))
        .ok_or_else(|| Error::DataDir("platform reports no data directory".to_string()))
}

pub fn catalog_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CATALOG_FILENAME)
}

pub fn journal_path(data_dir: &Path) -> PathBuf {
    data_dir.join(JOURNAL_FILENAME)
}

pub fn ignores_path(data_dir: &Path) -> PathBuf {
    data_dir.join(IGNORES_FILENAME)
}

/// Create the data directory (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let dir = resolve(Some(OsString::from("/tmp/plugdex-test"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/plugdex-test"));
    }

    #[test]
    fn test_platform_dir_has_app_name() {
        let dir = resolve(None).unwrap();
        assert!(dir.ends_with(APP_DIR_NAME));
    }

    #[test]
    fn test_file_names() {
        let dir = PathBuf::from("/data");
        assert_eq!(catalog_path(&dir), PathBuf::from("/data/plugins.db"));
        assert_eq!(journal_path(&dir), PathBuf::from("/data/scan_journal.db"));
        assert_eq!(ignores_path(&dir), PathBuf::from("/data/ignores.json"));
    }
}
