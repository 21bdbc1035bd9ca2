//! Sequential depth-first tree builder.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{self, DirEntry};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use mdtree_core::{
    Document, EntryFilter, IngestConfig, IngestError, IngestWarning, SourceNode, SourceTree,
    TreeStats, WarningKind,
};
use mdtree_render::Renderer;
use tracing::{debug, info, warn};

/// Builds [`SourceTree`] snapshots from a directory of Markdown files.
///
/// Each call to [`TreeBuilder::build`] walks the directory from scratch and
/// returns a newly allocated tree. Children keep the order in which the
/// filesystem enumerated them.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    config: IngestConfig,
    filter: EntryFilter,
    renderer: Renderer,
}

/// Mutable state for one build call.
#[derive(Default)]
struct BuildContext {
    /// Canonical directories on the current branch.
    visited: HashSet<PathBuf>,
    stats: TreeStats,
    warnings: Vec<IngestWarning>,
}

/// What a directory entry resolves to after following symlinks.
enum EntryKind {
    Directory,
    File,
    Other,
}

impl TreeBuilder {
    /// Create a builder for a config.
    pub fn new(config: IngestConfig) -> Result<Self, IngestError> {
        let filter = EntryFilter::new(&config)?;
        Ok(Self {
            config,
            filter,
            renderer: Renderer::default(),
        })
    }

    /// Use a specific renderer for document bodies.
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Entry filter derived from the configuration.
    pub fn filter(&self) -> &EntryFilter {
        &self.filter
    }

    /// Build a snapshot of the tree rooted at `root`.
    ///
    /// Fails only when the root itself is missing, unreadable or not a
    /// directory. Problems below the root become warnings on the snapshot.
    pub fn build(&self, root: &Path) -> Result<SourceTree, IngestError> {
        let start = Instant::now();

        let metadata = fs::metadata(root).map_err(|e| IngestError::io(root, e))?;
        if !metadata.is_dir() {
            return Err(IngestError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
        let root_path = root.canonicalize().map_err(|e| IngestError::io(root, e))?;

        info!(root = %root_path.display(), "Building source tree");

        let mut ctx = BuildContext::default();
        let entries = self
            .read_listing(&root_path, &mut ctx)
            .map_err(|e| IngestError::io(&root_path, e))?;

        ctx.visited.insert(root_path.clone());
        let mut node = SourceNode::root();
        self.fill_children(&mut node, entries, 0, &mut ctx);

        let duration = start.elapsed();
        info!(
            documents = ctx.stats.documents,
            directories = ctx.stats.directories,
            warnings = ctx.warnings.len(),
            "Built source tree in {:?}",
            duration
        );

        Ok(SourceTree::new(
            node,
            root_path,
            ctx.stats,
            duration,
            ctx.warnings,
        ))
    }

    /// Read at most `max_entries` entries of a directory, in enumeration order.
    fn read_listing(&self, dir: &Path, ctx: &mut BuildContext) -> std::io::Result<Vec<DirEntry>> {
        let max_entries = self.config.limits.max_entries;
        let mut entries = Vec::new();

        for (index, entry) in fs::read_dir(dir)?.enumerate() {
            if index >= max_entries {
                debug!(path = %dir.display(), "Entry limit reached, truncating listing");
                ctx.stats.record_truncation();
                ctx.warnings.push(IngestWarning::new(
                    dir,
                    format!("Listing truncated to {max_entries} entries"),
                    WarningKind::EntryLimit,
                ));
                break;
            }
            match entry {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(path = %dir.display(), "Failed to read directory entry: {}", err);
                    ctx.warnings.push(IngestWarning::read_error(dir, &err));
                }
            }
        }

        Ok(entries)
    }

    /// Append a node for each eligible entry of a directory at `depth`.
    fn fill_children(
        &self,
        node: &mut SourceNode,
        entries: Vec<DirEntry>,
        depth: u32,
        ctx: &mut BuildContext,
    ) {
        let child_depth = depth + 1;

        for entry in entries {
            let name = entry.file_name();
            if self.filter.is_skipped(&name) {
                debug!(name = %name.to_string_lossy(), "Skipping hidden or ignored entry");
                ctx.stats.record_skip();
                continue;
            }

            let path = entry.path();
            match self.resolve_kind(&entry, &path, ctx) {
                EntryKind::Directory => {
                    let child = self.build_directory(&name, &path, child_depth, ctx);
                    node.push(child);
                }
                EntryKind::File if self.filter.is_document_name(&name) => {
                    if !self.config.limits.allows_depth(child_depth) {
                        debug!(path = %path.display(), "Document beyond depth limit");
                        ctx.stats.record_skip();
                        continue;
                    }
                    let child = self.build_file(&name, &path, child_depth, ctx);
                    node.push(child);
                }
                EntryKind::File | EntryKind::Other => ctx.stats.record_skip(),
            }
        }
    }

    fn resolve_kind(&self, entry: &DirEntry, path: &Path, ctx: &mut BuildContext) -> EntryKind {
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(err) => {
                warn!(path = %path.display(), "Failed to read file type: {}", err);
                ctx.warnings.push(IngestWarning::read_error(path, &err));
                return EntryKind::Other;
            }
        };

        if file_type.is_dir() {
            return EntryKind::Directory;
        }
        if file_type.is_file() {
            return EntryKind::File;
        }
        if !file_type.is_symlink() || !self.config.follow_symlinks {
            return EntryKind::Other;
        }

        match fs::metadata(path) {
            Ok(m) if m.is_dir() => EntryKind::Directory,
            Ok(m) if m.is_file() => EntryKind::File,
            Ok(_) => EntryKind::Other,
            Err(err) => {
                debug!(path = %path.display(), "Broken symlink: {}", err);
                ctx.warnings.push(IngestWarning::new(
                    path,
                    format!("Broken symlink: {err}"),
                    WarningKind::EntryRead,
                ));
                EntryKind::Other
            }
        }
    }

    /// Build a directory node at `depth`.
    ///
    /// Directories beyond the depth bound, already on the current branch, or
    /// whose listing fails are returned without children.
    fn build_directory(
        &self,
        name: &OsStr,
        path: &Path,
        depth: u32,
        ctx: &mut BuildContext,
    ) -> SourceNode {
        let mut node = SourceNode::directory(name.to_string_lossy());
        ctx.stats.record_dir(depth);

        if !self.config.limits.allows_depth(depth) {
            debug!(path = %path.display(), depth, "Max depth reached, not descending");
            ctx.warnings.push(IngestWarning::new(
                path,
                format!("Deeper than {} levels", self.config.limits.max_depth),
                WarningKind::DepthLimit,
            ));
            return node;
        }

        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(err) => {
                warn!(path = %path.display(), "Failed to resolve directory: {}", err);
                ctx.warnings.push(IngestWarning::read_error(path, &err));
                return node;
            }
        };
        if !ctx.visited.insert(canonical.clone()) {
            debug!(path = %path.display(), "Circular reference detected, skipping");
            ctx.warnings.push(IngestWarning::cycle(path));
            return node;
        }

        match self.read_listing(path, ctx) {
            Ok(entries) => self.fill_children(&mut node, entries, depth, ctx),
            Err(err) => {
                warn!(path = %path.display(), "Error reading directory: {}", err);
                ctx.warnings.push(IngestWarning::read_error(path, &err));
            }
        }

        ctx.visited.remove(&canonical);
        node
    }

    /// Read and render one document. Never fails; problems yield a placeholder.
    fn build_file(
        &self,
        name: &OsStr,
        path: &Path,
        depth: u32,
        ctx: &mut BuildContext,
    ) -> SourceNode {
        let slug = self.filter.slug_of(name);
        let limit = self.config.limits.max_file_size;

        let size = match fs::metadata(path) {
            Ok(m) => m.len(),
            Err(err) => return self.read_failure(slug, path, &err, depth, ctx),
        };
        if size > limit {
            return self.too_large(slug, path, size, depth, ctx);
        }

        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(err) => return self.read_failure(slug, path, &err, depth, ctx),
        };
        // The file may have grown since the metadata call.
        if bytes.len() as u64 > limit {
            return self.too_large(slug, path, bytes.len() as u64, depth, ctx);
        }

        let text = String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());

        let rendered = panic::catch_unwind(AssertUnwindSafe(|| self.renderer.render(&text)));
        match rendered {
            Ok(html) => {
                ctx.stats.record_document(text.len() as u64, depth, false);
                SourceNode::file(Document::new(slug, text, html))
            }
            Err(_) => {
                warn!(path = %path.display(), "Failed to render document");
                ctx.warnings.push(IngestWarning::new(
                    path,
                    "Renderer panicked",
                    WarningKind::Transform,
                ));
                ctx.stats.record_document(0, depth, true);
                SourceNode::file(Document::read_error(slug))
            }
        }
    }

    fn too_large(
        &self,
        slug: String,
        path: &Path,
        size: u64,
        depth: u32,
        ctx: &mut BuildContext,
    ) -> SourceNode {
        let limit = self.config.limits.max_file_size;
        info!(path = %path.display(), size, limit, "File too large, skipping markdown processing");
        ctx.warnings.push(IngestWarning::too_large(path, size, limit));
        ctx.stats.record_document(0, depth, true);
        SourceNode::file(Document::too_large(slug))
    }

    fn read_failure(
        &self,
        slug: String,
        path: &Path,
        err: &std::io::Error,
        depth: u32,
        ctx: &mut BuildContext,
    ) -> SourceNode {
        warn!(path = %path.display(), "Error reading file: {}", err);
        ctx.warnings.push(IngestWarning::read_error(path, err));
        ctx.stats.record_document(0, depth, true);
        SourceNode::file(Document::read_error(slug))
    }
}

/// Build a tree with a one-off builder.
pub fn build_tree(root: &Path, config: IngestConfig) -> Result<SourceTree, IngestError> {
    TreeBuilder::new(config)?.build(root)
}
