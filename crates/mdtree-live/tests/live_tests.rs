use mdtree_live::{
    BroadcastHub, Engine, EngineConfig, HubMessage, SourceNode, WatchConfig, WatchState,
};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

const DEBOUNCE: Duration = Duration::from_millis(150);
const SETTLE: Duration = Duration::from_millis(1500);

fn create_test_wiki() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("a.md"), "# A").unwrap();
    fs::write(root.join("b.md"), "# B").unwrap();
    fs::create_dir(root.join("guides")).unwrap();
    fs::write(root.join("guides/setup.md"), "# Setup").unwrap();
    temp
}

fn engine() -> Engine {
    let config = EngineConfig::builder()
        .watch(WatchConfig { debounce: DEBOUNCE })
        .build()
        .unwrap();
    Engine::new(config).unwrap()
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&count);
    (count, move || {
        handle.fetch_add(1, Ordering::SeqCst);
    })
}

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if done() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    done()
}

fn root_children(engine: &Engine) -> usize {
    engine.current_tree().map(|t| t.root.child_count()).unwrap_or(0)
}

#[test]
fn test_hub_drops_only_dead_subscriber() {
    let hub = BroadcastHub::new();
    let mut live: Vec<_> = (0..4).map(|_| hub.subscribe()).collect();
    let dead = live.remove(2);
    let dead_id = dead.id();
    drop(dead);

    let delivered = hub.publish(HubMessage::SourcesUpdated {
        sources: Arc::new(SourceNode::root()),
    });

    assert_eq!(delivered, 3);
    assert!(!hub.is_subscribed(dead_id));
    for sub in &mut live {
        assert_eq!(*sub.try_recv().unwrap(), HubMessage::Connected);
        assert!(matches!(
            *sub.try_recv().unwrap(),
            HubMessage::SourcesUpdated { .. }
        ));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_rebuilds_once() {
    let wiki = create_test_wiki();
    let engine = engine();
    engine.ingest(wiki.path()).await.unwrap();
    assert_eq!(root_children(&engine), 3);

    let (updates, on_update) = counter();
    engine.start_watching(wiki.path(), on_update).unwrap();

    fs::remove_file(wiki.path().join("a.md")).unwrap();

    assert!(wait_until(|| updates.load(Ordering::SeqCst) >= 1).await);
    sleep(SETTLE).await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(root_children(&engine), 2);
    assert!(engine.current_tree().unwrap().root.child("a").is_none());

    engine.stop_watching();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_of_writes_rebuilds_once() {
    let wiki = create_test_wiki();
    let engine = engine();
    engine.ingest(wiki.path()).await.unwrap();

    let (updates, on_update) = counter();
    engine.start_watching(wiki.path(), on_update).unwrap();

    for name in ["c.md", "d.md", "e.md"] {
        fs::write(wiki.path().join(name), "# New").unwrap();
    }

    assert!(wait_until(|| updates.load(Ordering::SeqCst) >= 1).await);
    sleep(SETTLE).await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(root_children(&engine), 6);
}

/// A wiki under `workspace/wiki` plus a sibling `workspace/staging` outside
/// the watched root, so directories can be moved across the boundary.
fn create_wiki_with_staging() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let workspace = TempDir::new().unwrap();
    let wiki = workspace.path().join("wiki");
    let staging = workspace.path().join("staging");
    fs::create_dir_all(wiki.join("guides")).unwrap();
    fs::write(wiki.join("a.md"), "# A").unwrap();
    fs::write(wiki.join("guides/setup.md"), "# Setup").unwrap();
    fs::create_dir_all(staging.join("docs")).unwrap();
    fs::write(staging.join("docs/x.md"), "# X").unwrap();
    (workspace, wiki, staging)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_directory_moved_in_rebuilds() {
    let (_workspace, wiki, staging) = create_wiki_with_staging();
    let engine = engine();
    engine.ingest(&wiki).await.unwrap();
    assert_eq!(root_children(&engine), 2);

    let (updates, on_update) = counter();
    engine.start_watching(&wiki, on_update).unwrap();

    fs::rename(staging.join("docs"), wiki.join("docs")).unwrap();

    assert!(wait_until(|| updates.load(Ordering::SeqCst) >= 1).await);
    let tree = engine.current_tree().unwrap();
    assert_eq!(tree.root.child_count(), 3);
    assert!(tree.root.child("docs").and_then(|d| d.child("x")).is_some());

    // The moved-in directory is watched from the rebuild on.
    fs::write(wiki.join("docs/y.md"), "# Y").unwrap();
    assert!(wait_until(|| updates.load(Ordering::SeqCst) >= 2).await);
    let docs = engine.current_tree().unwrap();
    assert!(docs.root.child("docs").and_then(|d| d.child("y")).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_directory_moved_out_rebuilds() {
    let (_workspace, wiki, staging) = create_wiki_with_staging();
    let engine = engine();
    engine.ingest(&wiki).await.unwrap();

    let (updates, on_update) = counter();
    engine.start_watching(&wiki, on_update).unwrap();

    fs::rename(wiki.join("guides"), staging.join("guides")).unwrap();

    assert!(wait_until(|| updates.load(Ordering::SeqCst) >= 1).await);
    sleep(SETTLE).await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(root_children(&engine), 1);
    assert!(engine.current_tree().unwrap().root.child("guides").is_none());

    // Edits in the moved-away copy no longer reach the engine.
    fs::write(staging.join("guides/setup.md"), "# Changed").unwrap();
    sleep(SETTLE).await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ignored_directories_are_not_watched() {
    let wiki = create_test_wiki();
    fs::create_dir_all(wiki.path().join("node_modules/pkg/dist")).unwrap();
    fs::create_dir_all(wiki.path().join(".git/objects")).unwrap();

    let engine = engine();
    engine.start_watching(wiki.path(), || {}).unwrap();

    match engine.watch_state() {
        // The root and `guides`.
        WatchState::Armed { watched, errors, .. } => {
            assert_eq!(watched, 2);
            assert_eq!(errors, 0);
        }
        WatchState::Idle => panic!("expected an armed session"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_irrelevant_changes_ignored() {
    let wiki = create_test_wiki();
    let engine = engine();
    engine.ingest(wiki.path()).await.unwrap();

    let (updates, on_update) = counter();
    engine.start_watching(wiki.path(), on_update).unwrap();

    fs::write(wiki.path().join("notes.txt"), "plain").unwrap();
    fs::create_dir(wiki.path().join(".obsidian")).unwrap();
    fs::write(wiki.path().join(".obsidian/workspace.md"), "# hidden").unwrap();

    sleep(SETTLE).await;
    assert_eq!(updates.load(Ordering::SeqCst), 0);
    assert_eq!(engine.generation(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_on_update_reads_current_tree() {
    let wiki = create_test_wiki();
    let engine = engine();
    engine.ingest(wiki.path()).await.unwrap();

    // Reading the snapshot from the hook is allowed; ingesting is not.
    let seen = Arc::new(AtomicUsize::new(0));
    let reader = engine.clone();
    let hook_seen = Arc::clone(&seen);
    engine
        .start_watching(wiki.path(), move || {
            if let Some(tree) = reader.current_tree() {
                hook_seen.store(tree.root.child_count(), Ordering::SeqCst);
            }
        })
        .unwrap();

    fs::write(wiki.path().join("c.md"), "# C").unwrap();
    assert!(wait_until(|| seen.load(Ordering::SeqCst) == 4).await);

    // The hook holds an engine clone; stopping breaks the cycle.
    engine.stop_watching();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_reload_publishes_new_tree() {
    let wiki = create_test_wiki();
    let engine = engine();
    engine.ingest(wiki.path()).await.unwrap();

    let mut sub = engine.subscribe();
    assert_eq!(*sub.recv().await.unwrap(), HubMessage::Connected);

    engine.start_live_reload(wiki.path()).unwrap();
    fs::write(wiki.path().join("guides/deploy.md"), "# Deploy").unwrap();

    let message = timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("no update within timeout")
        .unwrap();

    let HubMessage::SourcesUpdated { sources } = &*message else {
        panic!("expected sources_updated, got {message:?}");
    };
    let guides = sources.child("guides").unwrap();
    assert!(guides.child("deploy").is_some());

    let current = engine.current_tree().unwrap();
    assert!(Arc::ptr_eq(sources, &current.root));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_rebuild_keeps_snapshot() {
    let parent = TempDir::new().unwrap();
    let root = parent.path().join("wiki");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.md"), "# A").unwrap();

    let engine = engine();
    let before = engine.ingest(&root).await.unwrap();
    let (updates, on_update) = counter();
    engine.start_watching(&root, on_update).unwrap();

    fs::remove_dir_all(&root).unwrap();
    sleep(SETTLE).await;

    assert_eq!(updates.load(Ordering::SeqCst), 0);
    assert!(Arc::ptr_eq(&before, &engine.current_tree().unwrap()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_watching_silences_changes() {
    let wiki = create_test_wiki();
    let engine = engine();
    engine.ingest(wiki.path()).await.unwrap();

    let (updates, on_update) = counter();
    engine.start_watching(wiki.path(), on_update).unwrap();
    engine.stop_watching();
    engine.stop_watching();
    assert_eq!(engine.watch_state(), WatchState::Idle);

    fs::write(wiki.path().join("late.md"), "# Late").unwrap();
    sleep(SETTLE).await;
    assert_eq!(updates.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_engine_stops_watching() {
    let wiki = create_test_wiki();
    let (updates, on_update) = counter();
    {
        let engine = engine();
        engine.start_watching(wiki.path(), on_update).unwrap();
    }

    fs::write(wiki.path().join("after.md"), "# After").unwrap();
    sleep(SETTLE).await;
    assert_eq!(updates.load(Ordering::SeqCst), 0);
}
