//! The sync engine: debounced recompute, diff against the active
//! registry, and broadcast of change sets to all connected sessions.
//!
//! Rebuilds are strictly serialized: triggers from the filesystem watcher
//! and from client writes land on one mpsc channel, a single consumer
//! drains them through a debounce window, and exactly one rebuild runs
//! per quiet period. The desired set is cached for a short window so
//! rapid successive triggers do not re-probe `node_modules`; any trigger
//! that can change membership (create/remove/rename, client writes)
//! invalidates the cache.

pub mod watcher;

use crate::hash::{read_for_transmission, FileDigest};
use crate::registry::ActiveRegistry;
use crate::resolver::{DependencyGraph, DesiredSetResolver};
use crate::wire::{ChangeEvent, InitialFile, ServerMessage, WirePathCodec};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory watched for source files.
    pub watch_dir: PathBuf,
    /// Root against which wire paths are relativized.
    pub project_root: PathBuf,
    /// Extensions (without dot) of files to mirror.
    pub tracked_extensions: Vec<String>,
    /// Quiet period collapsing event bursts into one rebuild.
    pub debounce: Duration,
    /// Validity window for reusing a computed desired set.
    pub desired_cache_ttl: Duration,
}

impl SyncConfig {
    pub fn new(watch_dir: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            project_root: project_root.into(),
            tracked_extensions: ["ts", "tsx", "js", "jsx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            debounce: Duration::from_millis(100),
            desired_cache_ttl: Duration::from_secs(1),
        }
    }
}

/// One qualifying event. `membership: true` means the set of mirrored
/// paths may have changed (create/remove/rename, client write/delete),
/// which invalidates the desired-set cache; a pure content modify does
/// not.
#[derive(Debug, Clone, Copy)]
pub struct RebuildTrigger {
    pub membership: bool,
}

struct CachedDesiredSet {
    computed_at: Instant,
    paths: HashSet<PathBuf>,
}

type SharedSnapshot = Shared<BoxFuture<'static, Arc<Vec<InitialFile>>>>;

/// Orchestrates recompute, diff, and broadcast. Shared by the watcher,
/// the rebuild loop, and every connected session.
pub struct SyncEngine {
    config: SyncConfig,
    codec: Arc<WirePathCodec>,
    resolver: DesiredSetResolver,
    registry: RwLock<ActiveRegistry>,
    broadcast_tx: broadcast::Sender<ServerMessage>,
    trigger_tx: mpsc::UnboundedSender<RebuildTrigger>,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<RebuildTrigger>>>,
    desired_cache: Mutex<Option<CachedDesiredSet>>,
    /// In-flight initial-snapshot computation shared by concurrent
    /// connections (single-flight).
    initial_inflight: Mutex<Option<SharedSnapshot>>,
    /// Number of actual desired-set computations (cache misses).
    resolve_count: AtomicU64,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Arc<Self> {
        Self::with_graph(config, None)
    }

    pub fn with_graph(
        config: SyncConfig,
        graph: Option<Arc<dyn DependencyGraph>>,
    ) -> Arc<Self> {
        let mut resolver = DesiredSetResolver::new(
            &config.watch_dir,
            &config.project_root,
            config.tracked_extensions.clone(),
        );
        if let Some(graph) = graph {
            resolver = resolver.with_graph(graph);
        }
        let (broadcast_tx, _) = broadcast::channel(256);
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            codec: Arc::new(WirePathCodec::new(&config.project_root)),
            config,
            resolver,
            registry: RwLock::new(ActiveRegistry::new()),
            broadcast_tx,
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            desired_cache: Mutex::new(None),
            initial_inflight: Mutex::new(None),
            resolve_count: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn codec(&self) -> &Arc<WirePathCodec> {
        &self.codec
    }

    pub fn project_root(&self) -> &Path {
        &self.config.project_root
    }

    /// Subscribe to change broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.broadcast_tx.subscribe()
    }

    /// Sender for watcher-originated triggers.
    pub fn trigger_sender(&self) -> mpsc::UnboundedSender<RebuildTrigger> {
        self.trigger_tx.clone()
    }

    /// Queue a rebuild after the debounce window.
    pub fn schedule_rebuild(&self, membership: bool) {
        if self.trigger_tx.send(RebuildTrigger { membership }).is_err() {
            tracing::error!("rebuild trigger channel closed");
        }
    }

    /// Run the debounced rebuild loop until the engine is dropped.
    /// Every qualifying event resets the debounce timer; only the timer
    /// expiring runs a rebuild, so rebuilds never overlap.
    pub fn spawn_rebuild_loop(self: Arc<Self>) -> JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            let Some(mut rx) = engine.trigger_rx.lock().await.take() else {
                tracing::error!("rebuild loop already running");
                return;
            };
            while let Some(first) = rx.recv().await {
                let mut membership = first.membership;
                loop {
                    match tokio::time::timeout(engine.config.debounce, rx.recv()).await {
                        Ok(Some(next)) => membership |= next.membership,
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
                engine.rebuild(membership).await;
            }
        })
    }

    /// The desired set, served from the time-boxed cache unless `force`
    /// or the cache has expired.
    async fn desired_set(&self, force: bool) -> HashSet<PathBuf> {
        let mut cache = self.desired_cache.lock().await;
        if !force {
            if let Some(cached) = cache.as_ref() {
                if cached.computed_at.elapsed() <= self.config.desired_cache_ttl {
                    return cached.paths.clone();
                }
            }
        }
        self.resolve_count.fetch_add(1, Ordering::Relaxed);
        let paths = self.resolver.compute().await;
        *cache = Some(CachedDesiredSet {
            computed_at: Instant::now(),
            paths: paths.clone(),
        });
        paths
    }

    /// One full recompute -> diff -> broadcast cycle.
    pub async fn rebuild(&self, membership_changed: bool) {
        let desired = self.desired_set(membership_changed).await;
        let mut registry = self.registry.write().await;
        let was_empty = registry.is_empty();
        let deletions = registry.stale_paths(&desired);

        // Empty transition: a never-populated registry converging on an
        // empty desired set broadcasts one empty snapshot, not deletes.
        if was_empty && desired.is_empty() {
            self.broadcast(ServerMessage::InitialSync {
                files: Vec::new(),
                directory: self.config.project_root.display().to_string(),
            });
            return;
        }

        // Collect adds/changes, reading content as we go. A failed read
        // skips the path this cycle and leaves the registry untouched.
        let mut outgoing: Vec<(ChangeEvent, PathBuf, FileDigest, String)> = Vec::new();
        for path in &desired {
            let Some((digest, content)) = read_for_transmission(path).await else {
                tracing::warn!("skipping unreadable file {}", path.display());
                continue;
            };
            let event = match registry.get(path) {
                None => ChangeEvent::Add,
                Some(prev) if *prev != digest => ChangeEvent::Change,
                Some(_) => continue,
            };
            outgoing.push((event, path.clone(), digest, content));
        }

        // Rehydration: an empty registry filling up in one cycle delivers
        // a coherent snapshot instead of N individually-ordered adds.
        let rehydration = was_empty
            && outgoing.iter().all(|(e, ..)| *e == ChangeEvent::Add)
            && outgoing.len() == desired.len();
        if rehydration {
            let mut files = Vec::with_capacity(outgoing.len());
            for (_, path, digest, content) in outgoing {
                files.push(InitialFile {
                    path: self.codec.to_wire(&path),
                    content,
                });
                registry.insert(path, digest);
            }
            files.sort_by(|a, b| a.path.cmp(&b.path));
            tracing::info!("rehydrated registry with {} files", files.len());
            self.broadcast(ServerMessage::InitialSync {
                files,
                directory: self.config.project_root.display().to_string(),
            });
            return;
        }

        // Deletions first, then adds/changes; the registry tracks each
        // event the moment it is emitted.
        for path in deletions {
            registry.remove(&path);
            self.broadcast(ServerMessage::FileChange {
                event: ChangeEvent::Delete,
                path: self.codec.to_wire(&path),
                content: None,
            });
        }
        for (event, path, digest, content) in outgoing {
            let wire = self.codec.to_wire(&path);
            registry.insert(path, digest);
            self.broadcast(ServerMessage::FileChange {
                event,
                path: wire,
                content: Some(content),
            });
        }
    }

    /// The initial snapshot for a newly connected session. Concurrent
    /// callers share one in-flight computation; the expensive resolution
    /// runs exactly once no matter how many sessions connect during it.
    pub async fn initial_snapshot(self: Arc<Self>) -> Arc<Vec<InitialFile>> {
        let snapshot = {
            let mut inflight = self.initial_inflight.lock().await;
            match inflight.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let engine = Arc::clone(&self);
                    // The slot is cleared from inside the shared future:
                    // the creating session may be dropped mid-handshake,
                    // and a completed future left in the slot would serve
                    // the same snapshot to every later connection.
                    let fut = async move {
                        let files = Arc::new(engine.build_initial().await);
                        *engine.initial_inflight.lock().await = None;
                        files
                    }
                    .boxed()
                    .shared();
                    *inflight = Some(fut.clone());
                    fut
                }
            }
        };
        snapshot.await
    }

    /// Build the sorted full-snapshot file list, populating the registry
    /// and restoring the codec's virtual-path cache as a side effect.
    ///
    /// The snapshot may observe filesystem state whose watcher trigger is
    /// still inside the debounce window. Registering it silently would
    /// make the following rebuild see "unchanged" and already-connected
    /// sessions would never hear about it, so every registry update here
    /// is paired with the same broadcast a rebuild would emit. The
    /// connecting session receives those events after its snapshot;
    /// re-applying them is a no-op for it.
    async fn build_initial(&self) -> Vec<InitialFile> {
        let desired = self.desired_set(false).await;
        let mut registry = self.registry.write().await;

        // Reconnection may arrive against a fresh codec; re-deriving wire
        // paths for everything active restores all virtual mappings.
        self.codec.rebuild_cache(registry.paths());

        for path in registry.stale_paths(&desired) {
            registry.remove(&path);
            self.broadcast(ServerMessage::FileChange {
                event: ChangeEvent::Delete,
                path: self.codec.to_wire(&path),
                content: None,
            });
        }

        let mut files = Vec::with_capacity(desired.len());
        for path in desired {
            let Some((digest, content)) = read_for_transmission(&path).await else {
                tracing::warn!("skipping unreadable file {}", path.display());
                continue;
            };
            let event = match registry.get(&path) {
                None => Some(ChangeEvent::Add),
                Some(prev) if *prev != digest => Some(ChangeEvent::Change),
                Some(_) => None,
            };
            let wire = self.codec.to_wire(&path);
            if let Some(event) = event {
                registry.insert(path, digest);
                self.broadcast(ServerMessage::FileChange {
                    event,
                    path: wire.clone(),
                    content: Some(content.clone()),
                });
            }
            files.push(InitialFile {
                path: wire,
                content,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    fn broadcast(&self, message: ServerMessage) {
        // No receivers is fine; sessions may not have connected yet.
        let _ = self.broadcast_tx.send(message);
    }

    #[cfg(test)]
    pub(crate) fn resolve_count(&self) -> u64 {
        self.resolve_count.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) async fn registry_len(&self) -> usize {
        self.registry.read().await.len()
    }
}
