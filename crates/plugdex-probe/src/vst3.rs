//! VST3 candidate enumeration.
//!
//! A `.vst3` entry can be a plain file (Windows, some Linux builds) or a
//! bundle directory (macOS, newer cross-platform SDKs). Either way the
//! candidate is the outer `.vst3` path; bundles are not descended into, so
//! the inner platform binary never shows up as a second candidate.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use plugdex_core::{CandidatePlugin, PluginType, model};

/// Platform-standard VST3 folders. Folders that do not exist are returned
/// anyway; enumeration skips them.
pub fn standard_folders() -> Vec<PathBuf> {
    let mut folders = Vec::new();

    #[cfg(target_os = "windows")]
    {
        for var in ["ProgramFiles", "ProgramFiles(x86)"] {
            if let Some(base) = std::env::var_os(var) {
                folders.push(PathBuf::from(base).join("Common Files").join("VST3"));
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs_next::home_dir() {
            folders.push(home.join("Library/Audio/Plug-Ins/VST3"));
        }
        folders.push(PathBuf::from("/Library/Audio/Plug-Ins/VST3"));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        if let Some(home) = dirs_next::home_dir() {
            folders.push(home.join(".vst3"));
        }
        folders.push(PathBuf::from("/usr/lib/vst3"));
        folders.push(PathBuf::from("/usr/local/lib/vst3"));
    }

    folders
}

/// Every `*.vst3` entry under the given folders.
pub fn find_in(folders: &[PathBuf]) -> Vec<CandidatePlugin> {
    let mut candidates = Vec::new();
    for folder in folders {
        if !folder.is_dir() {
            continue;
        }
        collect_folder(folder, &mut candidates);
    }
    candidates
}

fn collect_folder(folder: &Path, candidates: &mut Vec<CandidatePlugin>) {
    let mut walker = WalkDir::new(folder).follow_links(true).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("skipping unreadable entry under {}: {e}", folder.display());
                continue;
            }
        };
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "vst3") {
            // A bundle directory is itself the candidate; its inner
            // binary must not be found as a separate entry.
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            candidates.push(CandidatePlugin {
                path: path.to_path_buf(),
                name: model::file_stem(path),
                plugin_type: PluginType::Vst3,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_files_and_bundles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Flat.vst3"), b"").unwrap();
        let bundle = dir.path().join("Bundled.vst3");
        std::fs::create_dir_all(bundle.join("Contents/x86_64-linux")).unwrap();
        std::fs::write(bundle.join("Contents/x86_64-linux/Bundled.so"), b"").unwrap();
        std::fs::write(dir.path().join("README.txt"), b"").unwrap();

        let mut found = find_in(&[dir.path().to_path_buf()]);
        found.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Bundled");
        assert!(found[0].path.is_dir());
        assert_eq!(found[1].name, "Flat");
    }

    #[test]
    fn test_does_not_descend_into_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Outer.vst3");
        std::fs::create_dir_all(bundle.join("Contents/x86_64-win")).unwrap();
        // The inner binary carries the bundle extension on Windows layouts
        std::fs::write(bundle.join("Contents/x86_64-win/Outer.vst3"), b"").unwrap();

        let found = find_in(&[dir.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, bundle);
    }

    #[test]
    fn test_missing_folder_is_skipped() {
        let found = find_in(&[PathBuf::from("/nonexistent/vst3")]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_nested_vendor_folders_are_searched() {
        let dir = tempfile::tempdir().unwrap();
        let vendor = dir.path().join("Acme");
        std::fs::create_dir_all(&vendor).unwrap();
        std::fs::write(vendor.join("Deep.vst3"), b"").unwrap();

        let found = find_in(&[dir.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Deep");
    }
}
