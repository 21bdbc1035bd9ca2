//! Live reload for mdtree.
//!
//! An [`Engine`] owns the current [`SourceTree`](mdtree_core::SourceTree)
//! snapshot. It can rebuild that snapshot on demand, watch the source root
//! for document changes (debounced, so a burst of saves rebuilds once) and
//! push every rebuilt tree to subscribers through a [`BroadcastHub`].
//!
//! # Example
//!
//! ```rust,no_run
//! use mdtree_live::{Engine, EngineConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(EngineConfig::default())?;
//! engine.ingest("./wiki").await?;
//!
//! let mut updates = engine.subscribe();
//! engine.start_live_reload("./wiki")?;
//!
//! while let Some(message) = updates.recv().await {
//!     print!("{}", message.to_event_frame()?);
//! }
//! # Ok(())
//! # }
//! ```

mod debounce;
mod engine;
mod hub;
mod snapshot;
mod watcher;

pub use debounce::{DEFAULT_DEBOUNCE, DebounceState, Debouncer};
pub use engine::{Engine, EngineConfig, EngineConfigBuilder, WatchState};
pub use hub::{BroadcastHub, DEFAULT_SUBSCRIBER_CAPACITY, SubscriberId, Subscription};
pub use snapshot::SnapshotStore;
pub use watcher::{
    ChangeKind, FileChange, SourceWatcher, WatchConfig, WatchConfigBuilder, WatchError,
    relevant_changes,
};

pub use mdtree_core::{HubMessage, IngestConfig, IngestError, SourceNode, SourceTree};
pub use mdtree_render::RenderOptions;
