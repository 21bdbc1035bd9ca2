//! Source directory tree builder for mdtree.
//!
//! This crate walks a directory of Markdown documents and builds an
//! immutable [`SourceTree`] snapshot. Key properties:
//!
//! - **Sequential depth-first traversal** in filesystem enumeration order
//! - **Bounded** by depth, entries per directory and document size
//! - **Cycle-safe** when following symlinks
//! - **Never fails below the root**: unreadable entries become placeholders
//!   or empty directories plus a warning
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use mdtree_scan::{IngestConfig, TreeBuilder};
//!
//! let builder = TreeBuilder::new(IngestConfig::default()).unwrap();
//! let tree = builder.build(Path::new("./wiki")).unwrap();
//!
//! println!("{} documents", tree.total_documents());
//! for warning in &tree.warnings {
//!     eprintln!("{}: {}", warning.path.display(), warning.message);
//! }
//! ```

mod builder;

pub use builder::{TreeBuilder, build_tree};

// Re-export core types for convenience
pub use mdtree_core::{
    Document, IngestConfig, IngestError, IngestWarning, SourceNode, SourceTree, TraversalLimits,
    TreeStats, WarningKind,
};
