//! Candidate discovery: which plug-in files exist on this machine.
//!
//! The probe enumerates VST3 bundles in the platform's standard folders
//! (plus any user-supplied extras) and, on macOS, asks `auval` for the
//! installed Audio Unit effects. Candidates whose `"<type>/<stem>"` key is
//! in the persistent [`IgnoreSet`] are dropped before anything downstream
//! ever sees them.

pub mod au;
pub mod ignores;
pub mod vst3;

use std::collections::HashSet;
use std::path::PathBuf;

use plugdex_core::CandidatePlugin;

pub use ignores::IgnoreSet;

/// Probe errors
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ignore file is not a JSON string array: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Enumerates candidate plug-ins for one scan.
pub struct Probe {
    extra_folders: Vec<PathBuf>,
    standard_folders: bool,
    ignores: IgnoreSet,
}

impl Probe {
    pub fn new(ignores: IgnoreSet) -> Self {
        Self {
            extra_folders: Vec::new(),
            standard_folders: true,
            ignores,
        }
    }

    /// Additional VST3 folders to search besides the platform defaults.
    pub fn with_extra_folders(mut self, folders: Vec<PathBuf>) -> Self {
        self.extra_folders = folders;
        self
    }

    /// Whether the platform-standard folders (and `auval`) are consulted
    /// at all; turned off to scan exactly one folder or file.
    pub fn with_standard_folders(mut self, enabled: bool) -> Self {
        self.standard_folders = enabled;
        self
    }

    /// All candidates on this machine, ignore-filtered and deduplicated by
    /// path. Probe failures are category-scoped: a missing folder or a
    /// missing `auval` silently contributes nothing.
    pub fn candidates(&self) -> Vec<CandidatePlugin> {
        let mut folders = if self.standard_folders {
            vst3::standard_folders()
        } else {
            Vec::new()
        };
        folders.extend(self.extra_folders.iter().cloned());

        let mut found = vst3::find_in(&folders);
        if self.standard_folders {
            found.extend(au::find_candidates());
        }

        let mut seen = HashSet::new();
        found.retain(|c| seen.insert(c.path.clone()) && !self.ignores.contains(&c.ignore_key()));
        tracing::debug!("probe found {} candidates", found.len());
        found
    }
}
