//! The engine: ingest, current snapshot, watch sessions and live reload.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use derive_builder::Builder;
use mdtree_core::{IngestConfig, IngestError, SourceTree};
use mdtree_render::{RenderOptions, Renderer};
use mdtree_scan::TreeBuilder;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::debounce::{DebounceState, Debouncer};
use crate::hub::{BroadcastHub, DEFAULT_SUBSCRIBER_CAPACITY, SubscriberId, Subscription};
use crate::snapshot::SnapshotStore;
use crate::watcher::{SourceWatcher, WatchConfig, WatchError};

/// Everything needed to assemble an [`Engine`].
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), default)]
pub struct EngineConfig {
    /// Traversal limits, denylist and document extension.
    pub ingest: IngestConfig,
    /// Markdown rendering switches.
    pub render: RenderOptions,
    /// Debounce settings for watch sessions.
    pub watch: WatchConfig,
    /// Messages a subscriber may lag behind before it is dropped.
    pub subscriber_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            render: RenderOptions::default(),
            watch: WatchConfig::default(),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Start building a config from the defaults.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Observable state of the engine's watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    /// No session is running.
    Idle,
    /// A session is watching `root`.
    Armed {
        root: PathBuf,
        debounce: DebounceState,
        /// Directories holding an OS watch.
        watched: usize,
        errors: u64,
    },
}

impl WatchState {
    /// Check whether a session is running.
    pub fn is_armed(&self) -> bool {
        matches!(self, WatchState::Armed { .. })
    }
}

/// One active watch: the OS watcher plus its debounce task.
struct WatchSession {
    watcher: Arc<SourceWatcher>,
    debouncer: Debouncer,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Coordinates ingestion, the current snapshot, the watch session and the
/// broadcast hub.
///
/// `Engine` is cheap to clone; clones share all state. Dropping the last
/// clone stops any active watch session.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    builder: Arc<TreeBuilder>,
    snapshots: SnapshotStore,
    hub: BroadcastHub,
    watch: WatchConfig,
    session: Mutex<Option<WatchSession>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("generation", &self.inner.snapshots.generation())
            .field("subscribers", &self.inner.hub.subscriber_count())
            .field("watch", &self.watch_state())
            .finish()
    }
}

impl Engine {
    /// Create an engine. Fails only if the ingest configuration is invalid.
    pub fn new(config: EngineConfig) -> Result<Self, IngestError> {
        let builder = TreeBuilder::new(config.ingest)?.with_renderer(Renderer::new(config.render));
        Ok(Self {
            inner: Arc::new(EngineInner {
                builder: Arc::new(builder),
                snapshots: SnapshotStore::new(),
                hub: BroadcastHub::with_capacity(config.subscriber_capacity),
                watch: config.watch,
                session: Mutex::new(None),
            }),
        })
    }

    /// Build a tree from `root` and install it as the current snapshot.
    ///
    /// On failure the previous snapshot stays current.
    pub async fn ingest(&self, root: impl AsRef<Path>) -> Result<Arc<SourceTree>, IngestError> {
        let tree = rebuild(Arc::clone(&self.inner.builder), root.as_ref().to_path_buf()).await?;
        Ok(self.install(tree))
    }

    /// Synchronous variant of [`Engine::ingest`] for callers outside a runtime.
    pub fn ingest_blocking(&self, root: impl AsRef<Path>) -> Result<Arc<SourceTree>, IngestError> {
        let tree = self.inner.builder.build(root.as_ref())?;
        Ok(self.install(tree))
    }

    fn install(&self, tree: SourceTree) -> Arc<SourceTree> {
        log_tree(&tree);
        self.inner.snapshots.install(tree)
    }

    /// The most recently installed snapshot, or `None` before the first
    /// successful ingest.
    pub fn current_tree(&self) -> Option<Arc<SourceTree>> {
        self.inner.snapshots.load()
    }

    /// Number of snapshots installed so far.
    pub fn generation(&self) -> u64 {
        self.inner.snapshots.generation()
    }

    /// Watch `root` and rebuild after each burst of document changes.
    ///
    /// Only directories the scanner would list are watched. Hidden and
    /// denylisted subtrees and directories past the depth bound are not.
    /// Moving a whole directory in or out counts as a change. Before each
    /// rebuild the watches are synced with the directories on disk.
    ///
    /// `on_update` runs after every successful rebuild, once the new tree is
    /// current. Failed rebuilds are logged and leave the snapshot untouched.
    /// Any previous session is stopped first. Must be called from within a
    /// Tokio runtime.
    ///
    /// `on_update` runs while the snapshot install lock is held. It may read
    /// the current tree, but it must not call [`Engine::ingest`] or
    /// [`Engine::ingest_blocking`]; the lock is not reentrant and the call
    /// would deadlock.
    pub fn start_watching<F>(&self, root: impl AsRef<Path>, on_update: F) -> Result<(), WatchError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        self.stop_watching();

        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|source| WatchError::RootNotFound {
                path: root.to_path_buf(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Arc::new(SourceWatcher::new(
            &root,
            self.inner.builder.config(),
            self.inner.builder.filter().clone(),
            tx,
        )?);

        let debouncer = Debouncer::new(self.inner.watch.debounce);
        let cancel = CancellationToken::new();
        let on_fire = {
            let builder = Arc::clone(&self.inner.builder);
            let snapshots = self.inner.snapshots.clone();
            let on_update: Arc<dyn Fn() + Send + Sync> = Arc::new(on_update);
            let root = root.clone();
            let watcher = Arc::downgrade(&watcher);
            move || {
                let builder = Arc::clone(&builder);
                let snapshots = snapshots.clone();
                let on_update = Arc::clone(&on_update);
                let root = root.clone();
                let watcher = Weak::clone(&watcher);
                async move {
                    match rebuild_watched(builder, root, watcher).await {
                        Ok(tree) => {
                            log_tree(&tree);
                            snapshots.install_with(tree, |_| on_update());
                        }
                        Err(e) => error!(error = %e, "Rebuild after change failed"),
                    }
                }
            }
        };

        let task = debouncer.spawn(rx, cancel.clone(), on_fire);

        info!(
            root = %root.display(),
            debounce = ?self.inner.watch.debounce,
            watched = watcher.watch_count(),
            "Watching for changes"
        );
        *self.inner.session.lock() = Some(WatchSession {
            watcher,
            debouncer,
            cancel,
            _task: task,
        });
        Ok(())
    }

    /// Watch `root` and publish every rebuilt tree to all subscribers.
    ///
    /// Publishing happens inside the `on_update` hook of
    /// [`Engine::start_watching`] and follows the same locking rule.
    pub fn start_live_reload(&self, root: impl AsRef<Path>) -> Result<(), WatchError> {
        let hub = self.inner.hub.clone();
        let snapshots = self.inner.snapshots.clone();
        self.start_watching(root, move || {
            if let Some(tree) = snapshots.load() {
                hub.publish_tree(&tree);
            }
        })
    }

    /// Stop the active watch session, if any.
    ///
    /// A pending rebuild is discarded; one already running completes.
    pub fn stop_watching(&self) {
        if let Some(session) = self.inner.session.lock().take() {
            debug!(root = %session.watcher.root().display(), "Closing file watcher");
            drop(session);
        }
    }

    /// Snapshot of the watch session's state.
    pub fn watch_state(&self) -> WatchState {
        match self.inner.session.lock().as_ref() {
            None => WatchState::Idle,
            Some(session) => WatchState::Armed {
                root: session.watcher.root().to_path_buf(),
                debounce: session.debouncer.state(),
                watched: session.watcher.watch_count(),
                errors: session.watcher.error_count(),
            },
        }
    }

    /// The hub rebuilt trees are published to.
    pub fn hub(&self) -> &BroadcastHub {
        &self.inner.hub
    }

    /// Register a live-reload subscriber. See [`BroadcastHub::subscribe`].
    pub fn subscribe(&self) -> Subscription {
        self.inner.hub.subscribe()
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.hub.unsubscribe(id)
    }
}

async fn rebuild(builder: Arc<TreeBuilder>, root: PathBuf) -> Result<SourceTree, IngestError> {
    tokio::task::spawn_blocking(move || builder.build(&root))
        .await
        .unwrap_or_else(|e| {
            Err(IngestError::Interrupted {
                message: e.to_string(),
            })
        })
}

/// Sync the session's watches with the directories on disk, then rebuild.
/// Both run on the blocking pool.
async fn rebuild_watched(
    builder: Arc<TreeBuilder>,
    root: PathBuf,
    watcher: Weak<SourceWatcher>,
) -> Result<SourceTree, IngestError> {
    tokio::task::spawn_blocking(move || {
        if let Some(watcher) = watcher.upgrade() {
            watcher.resync();
        }
        builder.build(&root)
    })
    .await
    .unwrap_or_else(|e| {
        Err(IngestError::Interrupted {
            message: e.to_string(),
        })
    })
}

fn log_tree(tree: &SourceTree) {
    info!(
        root = %tree.root_path.display(),
        documents = tree.stats.documents,
        directories = tree.stats.directories,
        elapsed = ?tree.build_duration,
        "Source tree built"
    );
    if tree.has_warnings() {
        warn!(count = tree.warnings.len(), "Source tree built with warnings");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_no_tree_before_ingest() {
        assert!(engine().current_tree().is_none());
        assert_eq!(engine().watch_state(), WatchState::Idle);
    }

    #[test]
    fn test_ingest_blocking_installs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.md"), "# A").unwrap();

        let engine = engine();
        let tree = engine.ingest_blocking(temp.path()).unwrap();
        assert!(Arc::ptr_eq(&tree, &engine.current_tree().unwrap()));
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_start_watching_outside_runtime() {
        let temp = TempDir::new().unwrap();
        let result = engine().start_watching(temp.path(), || {});
        assert!(matches!(result, Err(WatchError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_failed_ingest_keeps_snapshot() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.md"), "# A").unwrap();

        let engine = engine();
        let first = engine.ingest(temp.path()).await.unwrap();
        let err = engine.ingest(temp.path().join("missing")).await.unwrap_err();

        assert!(err.is_root_not_found());
        assert!(Arc::ptr_eq(&first, &engine.current_tree().unwrap()));
    }

    #[tokio::test]
    async fn test_watch_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = engine().start_watching(temp.path().join("missing"), || {});
        assert!(matches!(result, Err(WatchError::RootNotFound { .. })));
    }

    #[tokio::test]
    async fn test_stop_watching_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let engine = engine();

        engine.stop_watching();
        engine.start_watching(temp.path(), || {}).unwrap();
        assert!(engine.watch_state().is_armed());

        engine.stop_watching();
        engine.stop_watching();
        assert_eq!(engine.watch_state(), WatchState::Idle);
    }

    #[tokio::test]
    async fn test_restart_replaces_session() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let engine = engine();

        engine.start_watching(first.path(), || {}).unwrap();
        engine.start_watching(second.path(), || {}).unwrap();

        match engine.watch_state() {
            WatchState::Armed { root, .. } => {
                assert_eq!(root, second.path().canonicalize().unwrap())
            }
            WatchState::Idle => panic!("expected an armed session"),
        }
    }
}
