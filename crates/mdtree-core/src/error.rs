//! Error and warning types for ingestion.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Errors that abort an ingestion.
///
/// Only problems with the root itself end up here; everything below the root
/// degrades to an [`IngestWarning`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// Root path is missing or its listing cannot be read.
    #[error("Root path does not exist or is not readable: {path}")]
    RootNotFound { path: PathBuf },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Generic I/O error on the root.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The build task was cancelled or panicked.
    #[error("Ingestion interrupted: {message}")]
    Interrupted { message: String },
}

impl IngestError {
    /// Create an I/O error for the root path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                Self::RootNotFound { path }
            }
            _ => Self::Io { path, source },
        }
    }

    /// Check whether this error is about a missing or unreadable root.
    pub fn is_root_not_found(&self) -> bool {
        matches!(self, Self::RootNotFound { .. })
    }
}

/// Kind of ingest warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A file or directory could not be read.
    EntryRead,
    /// A document could not be rendered.
    Transform,
    /// A document exceeded the size threshold.
    TooLarge,
    /// A path was reached again along the same branch.
    CycleDetected,
    /// A directory lies beyond the depth bound.
    DepthLimit,
    /// A directory listing was truncated.
    EntryLimit,
}

/// Non-fatal problem encountered while building a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl IngestWarning {
    /// Create a new ingest warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::new(path, format!("Read error: {error}"), WarningKind::EntryRead)
    }

    /// Create a too-large warning.
    pub fn too_large(path: impl Into<PathBuf>, size: u64, limit: u64) -> Self {
        Self::new(
            path,
            format!("Document is {size} bytes, limit is {limit}"),
            WarningKind::TooLarge,
        )
    }

    /// Create a cycle warning.
    pub fn cycle(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Already visited: {}", path.display()),
            path,
            kind: WarningKind::CycleDetected,
        }
    }
}
