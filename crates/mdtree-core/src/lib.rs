//! Core types and configuration for mdtree.
//!
//! This crate provides the data structures shared by the rest of the
//! workspace: source nodes and documents, tree snapshots, the messages pushed
//! to live subscribers, ingestion configuration and error types.

mod config;
mod error;
mod filter;
mod message;
mod node;
mod tree;

pub use config::{
    DEFAULT_EXTENSION, DEFAULT_IGNORE_PATTERNS, DEFAULT_MAX_DEPTH, DEFAULT_MAX_ENTRIES,
    DEFAULT_MAX_FILE_SIZE, IngestConfig, IngestConfigBuilder, TraversalLimits,
    TraversalLimitsBuilder,
};
pub use error::{IngestError, IngestWarning, WarningKind};
pub use filter::EntryFilter;
pub use message::HubMessage;
pub use node::{
    Document, READ_ERROR_MESSAGE, ROOT_NAME, SourceNode, TOO_LARGE_MESSAGE, title_from_slug,
};
pub use tree::{SourceTree, TreeStats};
