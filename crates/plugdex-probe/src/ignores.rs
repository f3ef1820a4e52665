//! The persistent ignore set.
//!
//! A JSON array of `"<type>/<stem>"` keys for plug-ins that must never be
//! scanned. Seeded from the packaged default list the first time it is
//! needed, and only ever changed by the operator (the `ignore` subcommand
//! or a text editor); repeated scan failures do not auto-insert here.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::Result;

const DEFAULT_IGNORES: &str = include_str!("../resources/default_ignores.json");

/// Set of plug-in keys to skip during probing
#[derive(Debug)]
pub struct IgnoreSet {
    path: PathBuf,
    entries: BTreeSet<String>,
}

impl IgnoreSet {
    /// Load the ignore file, seeding it from the packaged default when it
    /// does not exist yet.
    pub fn load_or_seed(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, DEFAULT_IGNORES)?;
        }
        let raw = std::fs::read_to_string(path)?;
        let entries: BTreeSet<String> = serde_json::from_str(&raw)?;
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Add a key; returns false if it was already present.
    pub fn insert(&mut self, key: &str) -> bool {
        self.entries.insert(key.to_string())
    }

    /// Remove a key; returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the set back to its file, sorted, pretty-printed.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries: Vec<&str> = self.entries.iter().map(String::as_str).collect();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeds_default_file_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignores.json");
        assert!(!path.exists());

        let set = IgnoreSet::load_or_seed(&path).unwrap();
        assert!(path.exists());
        assert!(set.is_empty());
    }

    #[test]
    fn test_insert_save_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignores.json");

        let mut set = IgnoreSet::load_or_seed(&path).unwrap();
        assert!(set.insert("vst3/CrashyPlugin"));
        assert!(!set.insert("vst3/CrashyPlugin"));
        set.save().unwrap();

        let reloaded = IgnoreSet::load_or_seed(&path).unwrap();
        assert!(reloaded.contains("vst3/CrashyPlugin"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = IgnoreSet::load_or_seed(&dir.path().join("ignores.json")).unwrap();
        set.insert("aufx/Bad");
        assert!(set.remove("aufx/Bad"));
        assert!(!set.remove("aufx/Bad"));
    }

    #[test]
    fn test_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignores.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        assert!(IgnoreSet::load_or_seed(&path).is_err());
    }
}
