//! Data model for scanned plug-ins.
//!
//! A [`PluginRecord`] is the unit of catalog storage: one scanned plug-in
//! with its identity and the parameter surface it exposed at default state.
//! The probe hands out [`CandidatePlugin`]s, which are keyed by file path
//! because nothing else is known before the plug-in has been loaded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// Supported plug-in formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// VST3 plug-in (all platforms)
    Vst3,
    /// Audio Unit effect (macOS)
    Aufx,
}

impl PluginType {
    /// The identifier used in catalog ids and the ignore set, e.g. `"vst3"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vst3 => "vst3",
            Self::Aufx => "aufx",
        }
    }

    /// File extension of the plug-in bundle, without the leading dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vst3 => "vst3",
            Self::Aufx => "component",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vst3" => Ok(Self::Vst3),
            "aufx" => Ok(Self::Aufx),
            other => Err(format!("unknown plugin type: {other}")),
        }
    }
}

/// A parameter value at the plug-in's default state.
///
/// Loaders report whatever scalar the plug-in exposes; text that parses as a
/// number or a boolean is coerced in that order (see [`ParamValue::from_text`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Floating-point value
    Float(f64),
    /// Boolean value (switches, bypass buttons)
    Bool(bool),
    /// Anything that is neither a number nor a boolean
    Text(String),
}

impl ParamValue {
    /// Coerce a raw textual value: float first, then bool, then plain text.
    pub fn from_text(raw: &str) -> Self {
        if let Ok(f) = raw.parse::<f64>() {
            return Self::Float(f);
        }
        match raw {
            "true" | "True" => Self::Bool(true),
            "false" | "False" => Self::Bool(false),
            _ => Self::Text(raw.to_string()),
        }
    }
}

/// A single named parameter of a plug-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginParameter {
    pub name: String,
    pub value: ParamValue,
}

/// A scanned plug-in as stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Stable catalog key, `"<type>/<file-stem>"`
    pub id: String,
    /// Display name reported by the loader, file stem as fallback
    pub name: String,
    /// Absolute path to the plug-in bundle or file
    pub path: String,
    /// Basename of `path`
    pub filename: String,
    pub plugin_type: PluginType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Parameter surface at default state, keyed by parameter name
    pub parameters: BTreeMap<String, PluginParameter>,
    /// Last-modified time of `path` at scan time, seconds since epoch (0 if unreadable)
    pub file_mtime: f64,
}

impl PluginRecord {
    /// The catalog id for a plug-in of `plugin_type` living at `path`.
    pub fn id_for(plugin_type: PluginType, path: &Path) -> String {
        format!("{}/{}", plugin_type.as_str(), file_stem(path))
    }
}

/// A plug-in file found by the probe, not yet loaded.
///
/// The path is the only stable handle at enumeration time; the name is the
/// probe's best guess (file stem for VST3, the advertised name for AU) and
/// is passed to the loader as a hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidatePlugin {
    pub path: std::path::PathBuf,
    pub name: String,
    pub plugin_type: PluginType,
}

impl CandidatePlugin {
    /// The `"<type>/<stem>"` key checked against the ignore set.
    pub fn ignore_key(&self) -> String {
        PluginRecord::id_for(self.plugin_type, &self.path)
    }
}

/// File stem of a plug-in path, `"unknown"` when the path has none.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().to_string())
}

/// Last-modified time of `path` in seconds since the epoch, 0.0 if unreadable.
pub fn file_mtime(path: &Path) -> f64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0.0, |d| d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_plugin_type_round_trip() {
        assert_eq!(PluginType::Vst3.as_str(), "vst3");
        assert_eq!("aufx".parse::<PluginType>().unwrap(), PluginType::Aufx);
        assert!("lv2".parse::<PluginType>().is_err());
    }

    #[test]
    fn test_param_value_coercion_order() {
        assert_eq!(ParamValue::from_text("0.5"), ParamValue::Float(0.5));
        assert_eq!(ParamValue::from_text("true"), ParamValue::Bool(true));
        assert_eq!(
            ParamValue::from_text("12 dB"),
            ParamValue::Text("12 dB".to_string())
        );
    }

    #[test]
    fn test_param_value_serializes_as_scalar() {
        let json = serde_json::to_string(&ParamValue::Float(0.5)).unwrap();
        assert_eq!(json, "0.5");
        let json = serde_json::to_string(&ParamValue::Bool(false)).unwrap();
        assert_eq!(json, "false");
    }

    #[test]
    fn test_record_id() {
        let id = PluginRecord::id_for(PluginType::Vst3, Path::new("/p/Pro-Q 3.vst3"));
        assert_eq!(id, "vst3/Pro-Q 3");
    }

    #[test]
    fn test_record_serde_round_trip() {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "gain".to_string(),
            PluginParameter {
                name: "gain".to_string(),
                value: ParamValue::Float(0.5),
            },
        );
        let record = PluginRecord {
            id: "vst3/TestGain".to_string(),
            name: "TestGain".to_string(),
            path: "/p/TestGain.vst3".to_string(),
            filename: "TestGain.vst3".to_string(),
            plugin_type: PluginType::Vst3,
            manufacturer: Some("Acme Audio".to_string()),
            parameters,
            file_mtime: 1_700_000_000.0,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: PluginRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_candidate_ignore_key() {
        let candidate = CandidatePlugin {
            path: PathBuf::from("/Library/Audio/Plug-Ins/VST3/Noises.vst3"),
            name: "Noises".to_string(),
            plugin_type: PluginType::Vst3,
        };
        assert_eq!(candidate.ignore_key(), "vst3/Noises");
    }

    #[test]
    fn test_mtime_of_missing_file() {
        assert_eq!(file_mtime(Path::new("/nonexistent/plugin.vst3")), 0.0);
    }
}
