//! Current-snapshot storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mdtree_core::SourceTree;
use parking_lot::{Mutex, RwLock};

/// Holds the current [`SourceTree`] and swaps it atomically.
///
/// Readers clone an `Arc` under a short read lock and never observe a tree
/// under construction. Installs are serialized so that whatever runs after a
/// swap (publishing, typically) happens in install order.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<SnapshotInner>,
}

#[derive(Debug, Default)]
struct SnapshotInner {
    current: RwLock<Option<Arc<SourceTree>>>,
    install: Mutex<()>,
    generation: AtomicU64,
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, if one has been installed.
    pub fn load(&self) -> Option<Arc<SourceTree>> {
        self.inner.current.read().clone()
    }

    /// Number of snapshots installed so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Replace the current snapshot.
    pub fn install(&self, tree: SourceTree) -> Arc<SourceTree> {
        self.install_with(tree, |_| {})
    }

    /// Replace the current snapshot and run `after` before the next install
    /// can start.
    ///
    /// `after` may call [`SnapshotStore::load`]; it must not install.
    pub fn install_with<F>(&self, tree: SourceTree, after: F) -> Arc<SourceTree>
    where
        F: FnOnce(&Arc<SourceTree>),
    {
        let tree = Arc::new(tree);
        let _serial = self.inner.install.lock();
        *self.inner.current.write() = Some(Arc::clone(&tree));
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        after(&tree);
        tree
    }
}
