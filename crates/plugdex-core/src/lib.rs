//! Core types and constants shared across the plugdex ecosystem.
//!
//! This crate provides the data model for scanned plug-ins and the
//! per-user file locations every other plugdex crate agrees on.

pub mod model;
pub mod paths;

pub use model::{CandidatePlugin, ParamValue, PluginParameter, PluginRecord, PluginType};

/// Common error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The per-user data directory could not be resolved
    #[error("no data directory available: {0}")]
    DataDir(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
