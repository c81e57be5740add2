//! Deployment-change detection.
//!
//! Watches a deployment root (exploded app directories or descriptor files)
//! and invalidates the container's caches when something changes, so the
//! next request re-resolves against the updated deployment. Redeploy itself
//! stays with the caller through the callback; a watcher that fires on a
//! half-written deployment must not start anything by itself.

use crate::webapp::container::WebAppContainer;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// Watch a deployment root and run `on_change` with the changed path on
/// every create, modify or remove. The container's caches are cleared
/// before the callback runs.
///
/// The returned watcher stops watching when dropped; keep it alive for the
/// lifetime of the container.
pub fn watch_deployments<P, F>(
    root: P,
    container: &Arc<WebAppContainer>,
    mut on_change: F,
) -> notify::Result<RecommendedWatcher>
where
    P: AsRef<Path>,
    F: FnMut(&Arc<WebAppContainer>, &Path) + Send + 'static,
{
    let root: PathBuf = root.as_ref().to_path_buf();
    let container: Weak<WebAppContainer> = Arc::downgrade(container);

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                let Some(container) = container.upgrade() else {
                    return;
                };
                for path in &event.paths {
                    tracing::info!(path = %path.display(), "deployment change detected");
                    container.clear_cache();
                    on_change(&container, path);
                }
            }
            Err(e) => tracing::warn!(error = %e, "deployment watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!(root = %root.display(), "watching deployment root");
    Ok(watcher)
}
