//! Audio Unit candidate enumeration (macOS).
//!
//! Audio Units are not discovered on disk: the platform validator knows
//! the installed set, so we shell out to `auval -l` and parse its effect
//! lines. Each line reports the component's location, usually as a
//! `file://` URL pointing somewhere inside the bundle; the candidate path
//! is the nearest `.component`/`.bundle` ancestor of that location.
//!
//! The parsing lives here unconditionally so it is testable on every
//! platform; only the `auval` invocation is macOS-gated.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use plugdex_core::{CandidatePlugin, PluginType};

/// An `aufx` line of `auval -l`:
/// `aufx CODE VEND  -  VENDOR: NAME (location)`
fn aufx_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"aufx\s+(\w+)\s+(\w+)\s+-\s+(.*?):\s+(.*?)\s+\((.*?)\)")
            .expect("aufx line regex is valid")
    })
}

/// One parsed `auval -l` effect line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuListing {
    pub vendor: String,
    pub name: String,
    /// Raw location field, a `file://` URL or a plain path
    pub location: String,
}

/// Parse the effect lines out of `auval -l` output.
pub fn parse_auval_output(output: &str) -> Vec<AuListing> {
    output
        .lines()
        .filter_map(|line| {
            aufx_line().captures(line.trim()).map(|caps| AuListing {
                vendor: caps[3].trim().to_string(),
                name: caps[4].trim().to_string(),
                location: caps[5].trim().to_string(),
            })
        })
        .collect()
}

/// Resolve an auval location to the component bundle path.
///
/// `auval` tends to report the binary inside the bundle
/// (`…/Foo.component/Contents/MacOS/Foo`), so walk upward to the nearest
/// bundle ancestor. Falls back to the reported path when no ancestor
/// qualifies.
pub fn resolve_bundle_path(location: &str) -> Option<PathBuf> {
    let raw = location.strip_prefix("file://").unwrap_or(location);
    let decoded = percent_decode(raw);
    if decoded.is_empty() {
        return None;
    }
    let reported = PathBuf::from(decoded);

    let mut current: &Path = &reported;
    loop {
        if current
            .extension()
            .is_some_and(|ext| ext == "component" || ext == "au" || ext == "bundle")
        {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => break,
        }
    }
    Some(reported)
}

/// Minimal percent-decoding for `file://` URLs (UTF-8 lossy).
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Installed Audio Unit effect candidates.
///
/// A missing or failing `auval` yields an empty list; AU scanning is
/// best-effort and must never abort a scan.
#[cfg(target_os = "macos")]
pub fn find_candidates() -> Vec<CandidatePlugin> {
    let output = match std::process::Command::new("auval").arg("-l").output() {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::warn!("auval -l exited with {}; skipping Audio Units", output.status);
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("auval not available ({e}); skipping Audio Units");
            return Vec::new();
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    listings_to_candidates(&parse_auval_output(&stdout))
}

#[cfg(not(target_os = "macos"))]
pub fn find_candidates() -> Vec<CandidatePlugin> {
    Vec::new()
}

/// Turn parsed listings into candidates with resolved bundle paths.
pub fn listings_to_candidates(listings: &[AuListing]) -> Vec<CandidatePlugin> {
    listings
        .iter()
        .filter_map(|listing| {
            let path = resolve_bundle_path(&listing.location)?;
            Some(CandidatePlugin {
                path,
                name: listing.name.clone(),
                plugin_type: PluginType::Aufx,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
    aufx achr Appl  -  Apple: AUMatrixReverb (file:///System/Library/Components/CoreAudio.component/Contents/MacOS/CoreAudio)\n\
    aufx bpas Appl  -  Apple: AUBandpass (file:///System/Library/Components/CoreAudio.component)\n\
    aumu dls  Appl  -  Apple: DLSMusicDevice (file:///System/Library/Components/DLSMusicDevice.component)\n\
    some unrelated line\n";

    #[test]
    fn test_parses_only_effect_lines() {
        let listings = parse_auval_output(SAMPLE);
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].vendor, "Apple");
        assert_eq!(listings[0].name, "AUMatrixReverb");
        assert_eq!(listings[1].name, "AUBandpass");
    }

    #[test]
    fn test_resolves_bundle_ancestor() {
        let path = resolve_bundle_path(
            "file:///Library/Audio/Plug-Ins/Components/Foo.component/Contents/MacOS/Foo",
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/Library/Audio/Plug-Ins/Components/Foo.component")
        );
    }

    #[test]
    fn test_resolves_percent_encoded_paths() {
        let path = resolve_bundle_path(
            "file:///Library/Audio/Plug-Ins/Components/Space%20Echo.component",
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/Library/Audio/Plug-Ins/Components/Space Echo.component")
        );
    }

    #[test]
    fn test_plain_path_without_bundle_ancestor() {
        let path = resolve_bundle_path("/usr/local/lib/foo").unwrap();
        assert_eq!(path, PathBuf::from("/usr/local/lib/foo"));
    }

    #[test]
    fn test_listings_to_candidates() {
        let candidates = listings_to_candidates(&parse_auval_output(SAMPLE));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].plugin_type, PluginType::Aufx);
        assert_eq!(candidates[0].ignore_key(), "aufx/CoreAudio");
    }
}
