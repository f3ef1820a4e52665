//! The worker side of the scan: load exactly one plug-in, write exactly
//! one journal row, exit.
//!
//! A worker never retries, never touches the catalog and never outlives
//! its plug-in. Crashing is an accepted outcome; the orchestrator
//! reconciles the row it leaves behind in `scanning`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use plugdex_core::{PluginParameter, PluginRecord, PluginType, model};
use plugdex_loader::{LoadedPlugin, loader_for};
use plugdex_store::{ScanJournal, ScanStatus};

use crate::Result;

/// The stable worker command-line contract
#[derive(Debug, clap::Parser)]
#[command(name = "plugdex-worker", about = "Scan a single plug-in into a journal row")]
pub struct WorkerArgs {
    /// Path to the plug-in bundle or file
    #[arg(long)]
    pub plugin_path: PathBuf,

    /// Tentative name from the probe, passed to the loader as a hint
    #[arg(long)]
    pub plugin_name: String,

    /// Plug-in format
    #[arg(long)]
    pub plugin_type: PluginType,

    /// Journal database to write the outcome into
    #[arg(long)]
    pub journal_path: PathBuf,
}

/// Run the worker contract to completion.
///
/// Only infrastructure failures (an unopenable journal) return an error;
/// everything the plug-in itself does wrong lands in the journal row.
pub fn run(args: &WorkerArgs) -> Result<()> {
    let journal = ScanJournal::open(&args.journal_path)?;
    let plugin_id = args.plugin_path.display().to_string();

    // Idempotent: the orchestrator usually marked the row already, and
    // manual retries may start from any prior status.
    journal.update(&plugin_id, ScanStatus::Scanning, None)?;

    // From here on the plug-in's code runs in this process; its chatter
    // must not reach our streams.
    plugdex_loader::silence_stdio();

    let loader = loader_for(args.plugin_type);
    match loader.open(&args.plugin_path, &args.plugin_name) {
        Ok(loaded) => {
            let record = build_record(args, &loaded);
            journal.record_success(&plugin_id, &record)?;
        }
        Err(e) => {
            journal.update(&plugin_id, ScanStatus::Failed, Some(&e.to_string()))?;
        }
    }
    Ok(())
}

/// Assemble the catalog record from what the loader extracted.
fn build_record(args: &WorkerArgs, loaded: &LoadedPlugin) -> PluginRecord {
    let stem = model::file_stem(&args.plugin_path);
    let name = loaded
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| stem.clone());

    let mut parameters = BTreeMap::new();
    for (param_name, value) in &loaded.parameters {
        parameters.insert(
            param_name.clone(),
            PluginParameter {
                name: param_name.clone(),
                value: value.clone(),
            },
        );
    }

    PluginRecord {
        id: PluginRecord::id_for(args.plugin_type, &args.plugin_path),
        name,
        path: args.plugin_path.display().to_string(),
        filename: args
            .plugin_path
            .file_name()
            .map_or_else(|| stem.clone(), |f| f.to_string_lossy().to_string()),
        plugin_type: args.plugin_type,
        manufacturer: loaded.manufacturer.clone(),
        parameters,
        file_mtime: model::file_mtime(&args.plugin_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugdex_core::ParamValue;

    fn args(path: &str) -> WorkerArgs {
        WorkerArgs {
            plugin_path: PathBuf::from(path),
            plugin_name: "Tentative".to_string(),
            plugin_type: PluginType::Vst3,
            journal_path: PathBuf::from("/unused.db"),
        }
    }

    #[test]
    fn test_record_uses_loader_name() {
        let loaded = LoadedPlugin {
            name: Some("Fancy EQ".to_string()),
            manufacturer: Some("Acme".to_string()),
            parameters: vec![("gain".to_string(), ParamValue::Float(0.5))],
        };
        let record = build_record(&args("/p/fancy-eq.vst3"), &loaded);
        assert_eq!(record.id, "vst3/fancy-eq");
        assert_eq!(record.name, "Fancy EQ");
        assert_eq!(record.filename, "fancy-eq.vst3");
        assert_eq!(record.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(record.parameters["gain"].value, ParamValue::Float(0.5));
    }

    #[test]
    fn test_record_falls_back_to_file_stem() {
        let loaded = LoadedPlugin {
            name: None,
            manufacturer: None,
            parameters: Vec::new(),
        };
        let record = build_record(&args("/p/bare.vst3"), &loaded);
        assert_eq!(record.name, "bare");
        assert!(record.parameters.is_empty());
        assert_eq!(record.file_mtime, 0.0);
    }

    #[test]
    fn test_duplicate_parameter_names_collapse() {
        let loaded = LoadedPlugin {
            name: None,
            manufacturer: None,
            parameters: vec![
                ("gain".to_string(), ParamValue::Float(0.25)),
                ("gain".to_string(), ParamValue::Float(0.75)),
            ],
        };
        let record = build_record(&args("/p/dup.vst3"), &loaded);
        assert_eq!(record.parameters.len(), 1);
        assert_eq!(record.parameters["gain"].value, ParamValue::Float(0.75));
    }
}
