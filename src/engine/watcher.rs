//! Filesystem watcher feeding the engine's debounce loop.
//!
//! notify delivers raw add/change/remove events for files and
//! directories; this module classifies them into rebuild triggers and
//! drops noise (hidden files, editor temp files, dependency churn under
//! `node_modules`). Coalescing happens downstream in the rebuild loop.

use super::{RebuildTrigger, SyncEngine};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;

/// Keeps the underlying watcher alive; dropping it stops watching.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Watch the engine's configured directory recursively, forwarding
    /// qualifying events as rebuild triggers.
    pub fn spawn(engine: &Arc<SyncEngine>) -> Result<Self, notify::Error> {
        let trigger_tx = engine.trigger_sender();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if let Some(trigger) = classify(&event) {
                        let _ = trigger_tx.send(trigger);
                    }
                }
                Err(e) => tracing::warn!("filesystem watch error: {}", e),
            })?;
        watcher.watch(&engine.config().watch_dir, RecursiveMode::Recursive)?;
        tracing::info!(
            "watching {} for changes",
            engine.config().watch_dir.display()
        );
        Ok(Self { _watcher: watcher })
    }
}

/// Classify a raw notify event. Creates, removes, and renames can change
/// set membership; content modifies cannot. Everything else is noise.
fn classify(event: &Event) -> Option<RebuildTrigger> {
    let membership = match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Name(_)) => true,
        EventKind::Modify(_) => false,
        _ => return None,
    };
    if event.paths.iter().all(|p| is_ignored(p)) {
        return None;
    }
    Some(RebuildTrigger { membership })
}

/// Paths whose events never warrant a rebuild. Dependency trees are
/// re-probed on the next source-triggered rebuild instead of tracking
/// their churn live.
fn is_ignored(path: &Path) -> bool {
    if path
        .components()
        .any(|c| c.as_os_str() == "node_modules" || c.as_os_str() == ".git")
    {
        return true;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.starts_with('.') || name.contains('~') || name.ends_with(".tmp"),
        None => true,
    }
}
