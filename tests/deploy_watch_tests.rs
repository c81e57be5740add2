use gantry::webapp::watch_deployments;
use gantry::{RuntimeConfig, WebAppContainer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod common;

#[test]
fn test_watch_deployments_clears_container_cache() {
    common::init_tracing();

    let dir = tempfile::tempdir().expect("tempdir");
    let container = WebAppContainer::new(&RuntimeConfig::default());
    let epoch_before = container.deploy_epoch();

    let changes = Arc::new(AtomicUsize::new(0));
    let changes_clone = changes.clone();

    let watcher = watch_deployments(dir.path(), &container, move |_container, _path| {
        changes_clone.fetch_add(1, Ordering::SeqCst);
    })
    .expect("watch_deployments");

    // allow watcher thread to start
    std::thread::sleep(Duration::from_millis(100));

    std::fs::write(dir.path().join("app.toml"), "context-path = \"/app\"\n").expect("write");

    for _ in 0..20 {
        if changes.load(Ordering::SeqCst) > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    assert!(changes.load(Ordering::SeqCst) > 0);
    assert!(container.deploy_epoch() > epoch_before);

    drop(watcher);
}
