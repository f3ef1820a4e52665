//! Deterministic loader used by the test suites.
//!
//! The behavior is keyed on the candidate's file stem so integration tests
//! can stage a directory of fake plug-in files and get every failure mode
//! a real fleet produces:
//!
//! - `boom*`: the loader raises (a clean load failure)
//! - `hang*`: the loader blocks far past any scan deadline
//! - `die*`: the process aborts (a hard worker crash)
//! - anything else loads with a small fixed parameter surface

use std::path::Path;
use std::time::Duration;

use plugdex_core::{ParamValue, model};

use crate::{LoadedPlugin, LoaderError, PluginLoader};

/// Fixed manufacturer reported by the stub
pub const STUB_MANUFACTURER: &str = "Stub Audio";

pub struct StubLoader;

impl PluginLoader for StubLoader {
    fn open(&self, path: &Path, name: &str) -> Result<LoadedPlugin, LoaderError> {
        let stem = model::file_stem(path);

        if stem.starts_with("boom") {
            return Err(LoaderError::Load(format!("stub loader refused {stem}")));
        }
        if stem.starts_with("hang") {
            std::thread::sleep(Duration::from_secs(600));
        }
        if stem.starts_with("die") {
            std::process::abort();
        }

        Ok(LoadedPlugin {
            name: Some(name.to_string()),
            manufacturer: Some(STUB_MANUFACTURER.to_string()),
            parameters: vec![
                ("gain".to_string(), ParamValue::Float(0.5)),
                ("bypass".to_string(), ParamValue::Bool(false)),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stub_success() {
        let plugin = StubLoader
            .open(&PathBuf::from("/p/nice.vst3"), "nice")
            .unwrap();
        assert_eq!(plugin.name.as_deref(), Some("nice"));
        assert_eq!(plugin.manufacturer.as_deref(), Some(STUB_MANUFACTURER));
        assert_eq!(plugin.parameters.len(), 2);
        assert_eq!(plugin.parameters[0].1, ParamValue::Float(0.5));
    }

    #[test]
    fn test_stub_failure() {
        let result = StubLoader.open(&PathBuf::from("/p/boom.vst3"), "boom");
        assert!(matches!(result, Err(LoaderError::Load(_))));
    }
}
