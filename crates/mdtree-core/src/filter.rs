//! Name-based entry filtering shared by the scanner and the watcher.

use std::ffi::OsStr;
use std::path::{Component, Path};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::IngestConfig;
use crate::error::IngestError;

/// Compiled hidden-entry, denylist and extension rules.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    ignore: GlobSet,
    extension: String,
    skip_hidden: bool,
    max_depth: u32,
}

impl EntryFilter {
    /// Compile the filter for a config.
    pub fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| IngestError::InvalidConfig {
                message: format!("bad ignore pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        let ignore = builder.build().map_err(|e| IngestError::InvalidConfig {
            message: e.to_string(),
        })?;

        Ok(Self {
            ignore,
            extension: config.extension.clone(),
            skip_hidden: config.skip_hidden,
            max_depth: config.limits.max_depth,
        })
    }

    /// Check whether an entry name is skipped outright (hidden or denylisted).
    pub fn is_skipped(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        (self.skip_hidden && name.starts_with('.')) || self.ignore.is_match(&*name)
    }

    /// Check whether a file name has the document extension.
    pub fn is_document_name(&self, name: &OsStr) -> bool {
        Path::new(name)
            .extension()
            .is_some_and(|ext| ext == OsStr::new(&self.extension))
    }

    /// Strip the document extension from a file name.
    pub fn slug_of(&self, name: &OsStr) -> String {
        let name = name.to_string_lossy();
        let suffix = format!(".{}", self.extension);
        name.strip_suffix(suffix.as_str())
            .unwrap_or(&name)
            .to_string()
    }

    /// Check whether a changed path under `root` can affect the tree.
    ///
    /// The path must be a document, no component below the root may be
    /// skipped, and its depth must be within the traversal bound.
    pub fn is_relevant_change(&self, root: &Path, path: &Path) -> bool {
        let Some(file_name) = path.file_name() else {
            return false;
        };
        self.is_document_name(file_name)
            && self.depth_below(root, path).is_some_and(|depth| depth <= self.max_depth)
    }

    /// Check whether a created, removed or renamed directory under `root`
    /// can affect the tree.
    ///
    /// Every listed directory shows its subdirectories as nodes (those one
    /// level past the bound stay empty), so moving one in or out changes the
    /// tree even when no document event follows.
    pub fn is_relevant_dir_change(&self, root: &Path, path: &Path) -> bool {
        self.depth_below(root, path)
            .is_some_and(|depth| (1..=self.max_depth.saturating_add(1)).contains(&depth))
    }

    /// Check whether a directory at `depth` below the root is listed by the
    /// scanner and so needs its own watch.
    pub fn wants_watch(&self, depth: u32) -> bool {
        depth <= self.max_depth
    }

    /// Depth of `path` below `root`, or `None` if any component is skipped
    /// or climbs out of the root.
    fn depth_below(&self, root: &Path, path: &Path) -> Option<u32> {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut depth = 0u32;
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    if self.is_skipped(name) {
                        return None;
                    }
                    depth += 1;
                }
                Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
                Component::ParentDir => return None,
            }
        }
        Some(depth)
    }
}
