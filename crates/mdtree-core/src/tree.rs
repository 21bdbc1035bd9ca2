//! Source tree snapshot and statistics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestWarning;
use crate::node::SourceNode;

/// Summary statistics for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Documents turned into file nodes (placeholders included).
    pub documents: u64,
    /// Directory nodes below the root.
    pub directories: u64,
    /// Documents replaced by a placeholder body.
    pub placeholders: u64,
    /// Entries skipped as hidden, denylisted or not a document.
    pub skipped: u64,
    /// Directories whose listing was cut at the entry bound.
    pub truncated_dirs: u64,
    /// Total bytes of document text read.
    pub total_bytes: u64,
    /// Deepest level reached.
    pub max_depth: u32,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document at `depth`.
    pub fn record_document(&mut self, bytes: u64, depth: u32, placeholder: bool) {
        self.documents += 1;
        self.total_bytes += bytes;
        self.max_depth = self.max_depth.max(depth);
        if placeholder {
            self.placeholders += 1;
        }
    }

    /// Record a directory at `depth`.
    pub fn record_dir(&mut self, depth: u32) {
        self.directories += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Record a skipped entry.
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Record a truncated directory listing.
    pub fn record_truncation(&mut self) {
        self.truncated_dirs += 1;
    }
}

/// One complete, immutable snapshot of the source tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTree {
    /// Root directory node, always named `root`.
    pub root: Arc<SourceNode>,

    /// Root path that was ingested.
    pub root_path: PathBuf,

    /// When this snapshot was built.
    pub built_at: DateTime<Utc>,

    /// Duration of the build.
    pub build_duration: Duration,

    /// Summary statistics.
    pub stats: TreeStats,

    /// Warnings encountered during the build.
    pub warnings: Vec<IngestWarning>,
}

impl SourceTree {
    /// Create a new snapshot.
    pub fn new(
        root: SourceNode,
        root_path: PathBuf,
        stats: TreeStats,
        build_duration: Duration,
        warnings: Vec<IngestWarning>,
    ) -> Self {
        Self {
            root: Arc::new(root),
            root_path,
            built_at: Utc::now(),
            build_duration,
            stats,
            warnings,
        }
    }

    /// Get the total number of documents.
    pub fn total_documents(&self) -> u64 {
        self.stats.documents
    }

    /// Get the total number of directories below the root.
    pub fn total_dirs(&self) -> u64 {
        self.stats.directories
    }

    /// Check if there were any warnings during the build.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_stats_record() {
        let mut stats = TreeStats::new();
        stats.record_document(120, 2, false);
        stats.record_document(0, 1, true);
        stats.record_dir(1);

        assert_eq!(stats.documents, 2);
        assert_eq!(stats.placeholders, 1);
        assert_eq!(stats.total_bytes, 120);
        assert_eq!(stats.max_depth, 2);
    }

    #[test]
    fn test_source_tree_new() {
        let tree = SourceTree::new(
            SourceNode::root(),
            PathBuf::from("/wiki"),
            TreeStats::new(),
            Duration::from_millis(3),
            Vec::new(),
        );
        assert_eq!(tree.root.name(), "root");
        assert!(!tree.has_warnings());
        assert_eq!(tree.total_documents(), 0);
    }
}
