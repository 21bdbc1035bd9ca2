//! Filesystem watcher producing relevant document changes.
//!
//! Only directories the scanner would list are watched, each without
//! recursion. Hidden and denylisted subtrees, and anything past the depth
//! bound, never receive an OS watch. The set is brought up to date by
//! [`SourceWatcher::resync`], which the engine runs before every rebuild.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use derive_builder::Builder;
use mdtree_core::{EntryFilter, IngestConfig};
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::debounce::DEFAULT_DEBOUNCE;

/// Errors that prevent a watch session from starting.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watch root not found: {path}")]
    RootNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("Failed to watch {path}: {source}")]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Watching requires a running Tokio runtime")]
    NoRuntime,
}

/// Watch session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
#[builder(setter(into), default)]
pub struct WatchConfig {
    /// Quiet period after the last change before rebuilding.
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl WatchConfig {
    /// Start building a config from the defaults.
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }
}

/// What happened below the watched root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    /// The backend dropped events; the whole tree has to be re-read.
    Rescan,
}

impl ChangeKind {
    /// Classify a raw notify event kind. Access and metadata-only events are
    /// not changes; reading documents during a rebuild produces them.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            _ => None,
        }
    }
}

/// A relevant change to a document or directory below the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Registered OS watches, keyed by directory.
struct WatchSet {
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

/// Directories found by one walk of the root.
#[derive(Debug, Default)]
struct DirectoryScan {
    /// Directories the scanner lists; each gets a watch.
    listed: HashSet<PathBuf>,
    /// Every directory that shows up as a node, listed or not.
    shown: HashSet<PathBuf>,
}

/// Scoped watch over a root directory.
///
/// Relevant changes are forwarded to the channel given at construction; the
/// watch ends when this value is dropped.
pub struct SourceWatcher {
    root: PathBuf,
    filter: EntryFilter,
    follow_symlinks: bool,
    max_entries: usize,
    set: Mutex<WatchSet>,
    /// Directories currently shown in the tree. The event handler consults
    /// it to recognize removed directories, which can no longer be stat'ed.
    known_dirs: Arc<RwLock<HashSet<PathBuf>>>,
    errors: Arc<AtomicU64>,
}

impl std::fmt::Debug for SourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatcher")
            .field("root", &self.root)
            .field("watched", &self.set.lock().watched.len())
            .field("errors", &self.errors.load(Ordering::Relaxed))
            .finish()
    }
}

impl SourceWatcher {
    /// Start watching `root`, which should already be canonical.
    ///
    /// Only the root itself must be watchable. Subdirectories that cannot be
    /// watched are logged and counted in [`SourceWatcher::error_count`].
    pub fn new(
        root: &Path,
        config: &IngestConfig,
        filter: EntryFilter,
        tx: mpsc::UnboundedSender<FileChange>,
    ) -> Result<Self, WatchError> {
        let errors = Arc::new(AtomicU64::new(0));
        let known_dirs = Arc::new(RwLock::new(HashSet::new()));

        let handler_errors = Arc::clone(&errors);
        let handler_known = Arc::clone(&known_dirs);
        let handler_root = root.to_path_buf();
        let handler_filter = filter.clone();

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let changes = relevant_changes(
                        &event,
                        &handler_root,
                        &handler_filter,
                        &handler_known.read(),
                    );
                    for change in changes {
                        // The receiver is gone once the session stops.
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    handler_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "File watcher error");
                }
            })
            .map_err(WatchError::Create)?;

        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::WatchPath {
                path: root.to_path_buf(),
                source,
            })?;

        let source_watcher = Self {
            root: root.to_path_buf(),
            filter,
            follow_symlinks: config.follow_symlinks,
            max_entries: config.limits.max_entries,
            set: Mutex::new(WatchSet {
                watcher,
                watched: HashSet::from([root.to_path_buf()]),
            }),
            known_dirs,
            errors,
        };
        source_watcher.resync();
        Ok(source_watcher)
    }

    /// The watched root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Errors reported by the underlying watcher so far.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Number of directories holding an OS watch.
    pub fn watch_count(&self) -> usize {
        self.set.lock().watched.len()
    }

    /// Directories holding an OS watch, sorted.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.set.lock().watched.iter().cloned().collect();
        dirs.sort();
        dirs
    }

    /// Walk the root and make the OS watches match the directories the
    /// scanner would list. Returns the number of watched directories.
    ///
    /// Blocks on filesystem access; async callers should use
    /// `spawn_blocking`.
    pub fn resync(&self) -> usize {
        let scan = self.scan_directories();
        *self.known_dirs.write() = scan.shown;

        let mut set = self.set.lock();
        let WatchSet { watcher, watched } = &mut *set;

        // Stale watches go first. A directory renamed within the root keeps
        // its OS watch under the old path until that path is released.
        let stale: Vec<PathBuf> = watched
            .iter()
            .filter(|dir| !scan.listed.contains(*dir))
            .cloned()
            .collect();
        for dir in stale {
            // Removed directories have already lost their watch.
            if let Err(e) = watcher.unwatch(&dir) {
                trace!(path = %dir.display(), error = %e, "Unwatch failed");
            }
            watched.remove(&dir);
        }

        for dir in scan.listed {
            if watched.contains(&dir) {
                continue;
            }
            match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    watched.insert(dir);
                }
                Err(e) => {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(path = %dir.display(), error = %e, "Failed to watch directory");
                }
            }
        }

        debug!(root = %self.root.display(), watched = watched.len(), "Watches synced");
        watched.len()
    }

    fn scan_directories(&self) -> DirectoryScan {
        let mut scan = DirectoryScan::default();
        let mut branch = HashSet::new();
        self.visit(&self.root, 0, &mut branch, &mut scan);
        scan
    }

    fn visit(&self, dir: &Path, depth: u32, branch: &mut HashSet<PathBuf>, scan: &mut DirectoryScan) {
        if !self.filter.wants_watch(depth) {
            return;
        }
        let Ok(canonical) = dir.canonicalize() else {
            return;
        };
        // Symlink cycles.
        if !branch.insert(canonical.clone()) {
            return;
        }
        scan.listed.insert(dir.to_path_buf());

        match fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.take(self.max_entries).flatten() {
                    if self.filter.is_skipped(&entry.file_name()) {
                        continue;
                    }
                    let path = entry.path();
                    if !self.is_directory(&entry, &path) {
                        continue;
                    }
                    scan.shown.insert(path.clone());
                    self.visit(&path, depth + 1, branch, scan);
                }
            }
            Err(e) => debug!(path = %dir.display(), error = %e, "Cannot list directory for watching"),
        }

        branch.remove(&canonical);
    }

    fn is_directory(&self, entry: &fs::DirEntry, path: &Path) -> bool {
        match entry.file_type() {
            Ok(t) if t.is_dir() => true,
            Ok(t) if t.is_symlink() && self.follow_symlinks => {
                fs::metadata(path).is_ok_and(|m| m.is_dir())
            }
            _ => false,
        }
    }
}

/// Changes in `event` that can affect the tree built from `root`.
///
/// Documents qualify through [`EntryFilter::is_relevant_change`]. Creating,
/// removing or renaming a directory qualifies through
/// [`EntryFilter::is_relevant_dir_change`]; a path counts as a directory when
/// the event says so, when it is in `known_dirs`, or when it is one now.
pub fn relevant_changes(
    event: &Event,
    root: &Path,
    filter: &EntryFilter,
    known_dirs: &HashSet<PathBuf>,
) -> Vec<FileChange> {
    if event.need_rescan() {
        return vec![FileChange {
            kind: ChangeKind::Rescan,
            path: root.to_path_buf(),
        }];
    }
    let Some(kind) = ChangeKind::from_event_kind(&event.kind) else {
        return Vec::new();
    };

    let changes: Vec<FileChange> = event
        .paths
        .iter()
        .filter(|path| {
            filter.is_relevant_change(root, path)
                || (is_directory_event(&event.kind, path, known_dirs)
                    && filter.is_relevant_dir_change(root, path))
        })
        .map(|path| FileChange {
            kind,
            path: path.clone(),
        })
        .collect();

    if changes.is_empty() {
        trace!(kind = ?event.kind, paths = ?event.paths, "Ignoring event");
    }
    changes
}

fn is_directory_event(kind: &EventKind, path: &Path, known_dirs: &HashSet<PathBuf>) -> bool {
    match kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => true,
        EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => false,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            known_dirs.contains(path) || path.is_dir()
        }
        _ => false,
    }
}
