//! Error handling for ki-qihe
//!
//! This module provides unified error handling using anyhow for error propagation
//! and context information, plus the domain errors the exporter can raise.

use anyhow::Context;
use std::path::Path;

pub type Result<T> = anyhow::Result<T>;

/// Extension trait for Results to add context with file paths
pub trait ResultExt<T> {
    /// Add context with file path information
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T>;

    /// Add context naming the board side being exported
    fn with_layer_context(self, layer: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error> + Send + Sync + 'static,
{
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Failed to {} file: {}", operation, path.as_ref().display()))
    }

    fn with_layer_context(self, layer: &str) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error exporting {}", layer))
    }
}

/// Specific error types for ki-qihe operations
#[derive(Debug, thiserror::Error)]
pub enum QiheError {
    #[error("Not a KiCad board file: {reason}")]
    InvalidBoard { reason: String },

    #[error("Board file has no usable name: {path}")]
    UnnamedBoard { path: String },

    #[error("Mapping file does not exist: {path}")]
    MappingFileMissing { path: String },

    #[error("No board selected; the board folder mapping location needs one")]
    NoBoardSelected,

    #[error("Default mapping template is missing from the embedded assets")]
    MissingTemplate,

    #[error("Invalid mapping location {value}, expected 0 (plugin folder) or 1 (board folder)")]
    InvalidMappingLocation { value: String },
}
