//! Plug-in loading boundary.
//!
//! This crate defines the [`PluginLoader`] trait that separates the scan
//! machinery from the native plug-in SDK surface, plus the implementations:
//! a real VST3 loader (dynamic loading + COM-style factory queries), a
//! minimal Audio Unit loader, and a deterministic stub used by the test
//! suites. Only the worker process ever calls a native loader, so anything
//! a misbehaving plug-in does on load is contained there.

pub mod au;
pub mod ffi;
pub mod stub;
pub mod vst3;

use std::path::Path;

use plugdex_core::{ParamValue, PluginType};

/// Environment variable selecting the loader implementation.
///
/// `PLUGDEX_LOADER=stub` forces the deterministic stub in any process;
/// the orchestrator forwards it to workers so whole-scan tests run without
/// real plug-ins installed.
pub const LOADER_ENV: &str = "PLUGDEX_LOADER";

/// What a loader managed to extract from one plug-in.
///
/// Extraction happens eagerly inside [`PluginLoader::open`]; by the time a
/// handle exists, the native library is already unloaded again.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPlugin {
    /// Display name, when the plug-in exposes one
    pub name: Option<String>,
    /// Manufacturer / vendor string, when exposed
    pub manufacturer: Option<String>,
    /// Parameter names with their default-state values
    pub parameters: Vec<(String, ParamValue)>,
}

/// A plug-in loading backend
pub trait PluginLoader {
    /// Load the plug-in at `path`, using `name` as the probe's hint for
    /// which of the file's plug-ins is wanted, and extract its surface.
    fn open(&self, path: &Path, name: &str) -> Result<LoadedPlugin, LoaderError>;
}

/// Loader errors
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("plugin not found: {0}")]
    NotFound(std::path::PathBuf),

    #[error("failed to load plugin library: {0}")]
    Library(String),

    #[error("plugin entry point missing: {0}")]
    EntryPoint(String),

    #[error("plugin factory error: {0}")]
    Factory(String),

    #[error("load failure: {0}")]
    Load(String),
}

/// Select the loader for a plug-in type, honoring the `PLUGDEX_LOADER`
/// override.
pub fn loader_for(plugin_type: PluginType) -> Box<dyn PluginLoader> {
    if std::env::var(LOADER_ENV).as_deref() == Ok("stub") {
        return Box::new(stub::StubLoader);
    }
    match plugin_type {
        PluginType::Vst3 => Box::new(vst3::Vst3Loader),
        PluginType::Aufx => Box::new(au::AuLoader),
    }
}

/// Point this process's stdout and stderr at the null device.
///
/// Plug-ins print freely while loading; the worker calls this before the
/// first loader call so none of that ever reaches a stream the parent
/// reads. The redirect is irreversible for the remaining process lifetime.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn silence_stdio() {
    unsafe {
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if devnull >= 0 {
            libc::dup2(devnull, libc::STDOUT_FILENO);
            libc::dup2(devnull, libc::STDERR_FILENO);
            if devnull > libc::STDERR_FILENO {
                libc::close(devnull);
            }
        }
    }
}

#[cfg(not(unix))]
pub fn silence_stdio() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_loader_rejects_missing_file() {
        let loader = vst3::Vst3Loader;
        let result = loader.open(Path::new("/nonexistent/Missing.vst3"), "Missing");
        assert!(matches!(result, Err(LoaderError::NotFound(_))));
    }
}
