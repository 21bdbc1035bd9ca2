//! Ingestion configuration types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default maximum traversal depth below the root.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Default maximum number of entries processed per directory.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Default maximum document size in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10_000_000;

/// Default document extension.
pub const DEFAULT_EXTENSION: &str = "md";

/// Housekeeping directories skipped by default.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] =
    &["node_modules", ".git", ".next", "target", "dist", "build"];

/// Bounds applied to every traversal.
///
/// Exceeding a bound trims the tree; it is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct TraversalLimits {
    /// Maximum depth below the root (root = 0).
    #[builder(default = "DEFAULT_MAX_DEPTH")]
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum enumerated entries processed per directory.
    #[builder(default = "DEFAULT_MAX_ENTRIES")]
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Documents larger than this are replaced by a placeholder.
    #[builder(default = "DEFAULT_MAX_FILE_SIZE")]
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl TraversalLimits {
    /// Create a new limits builder.
    pub fn builder() -> TraversalLimitsBuilder {
        TraversalLimitsBuilder::default()
    }

    /// Check whether an entry at `depth` is within the depth bound.
    pub fn allows_depth(&self, depth: u32) -> bool {
        depth <= self.max_depth
    }
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Configuration for ingesting a source directory.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct IngestConfig {
    /// Traversal bounds.
    #[builder(default)]
    #[serde(default)]
    pub limits: TraversalLimits,

    /// Extension (without the dot) of eligible documents.
    #[builder(default = "DEFAULT_EXTENSION.to_string()")]
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Skip entries whose name starts with `.`.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub skip_hidden: bool,

    /// Follow symbolic links to files and directories.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,

    /// Entry names to skip (glob syntax, matched against the name only).
    #[builder(default = "default_ignore_patterns()")]
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

impl IngestConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref ext) = self.extension {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(format!("Invalid document extension: {ext:?}"));
            }
        }
        if let Some(ref patterns) = self.ignore_patterns {
            for pattern in patterns {
                globset::Glob::new(pattern).map_err(|e| e.to_string())?;
            }
        }
        if let Some(limits) = self.limits {
            if limits.max_entries == 0 {
                return Err("max_entries must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

impl IngestConfig {
    /// Create a new ingest config builder.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Config with default limits and the given traversal bounds.
    pub fn with_limits(limits: TraversalLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            limits: TraversalLimits::default(),
            extension: default_extension(),
            skip_hidden: true,
            follow_symlinks: true,
            ignore_patterns: default_ignore_patterns(),
        }
    }
}
