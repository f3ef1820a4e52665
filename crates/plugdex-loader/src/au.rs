//! Audio Unit loader.
//!
//! Audio Unit identity comes from the validator listing the probe already
//! parsed, so this loader only confirms the component bundle exists and
//! reports the name it was handed. Instantiating the unit to read its
//! parameter surface needs the platform AU host SDK, which stays outside
//! this tool; records for Audio Units carry an empty parameter map.

use std::path::Path;

use crate::{LoadedPlugin, LoaderError, PluginLoader};

pub struct AuLoader;

impl PluginLoader for AuLoader {
    fn open(&self, path: &Path, name: &str) -> Result<LoadedPlugin, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::NotFound(path.to_path_buf()));
        }
        Ok(LoadedPlugin {
            name: Some(name.to_string()),
            manufacturer: None,
            parameters: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_component() {
        let result = AuLoader.open(Path::new("/nonexistent/Foo.component"), "Foo");
        assert!(matches!(result, Err(LoaderError::NotFound(_))));
    }

    #[test]
    fn test_existing_component_reports_probe_name() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Echo.component");
        std::fs::create_dir_all(&bundle).unwrap();

        let plugin = AuLoader.open(&bundle, "AUEcho").unwrap();
        assert_eq!(plugin.name.as_deref(), Some("AUEcho"));
        assert!(plugin.parameters.is_empty());
    }
}
