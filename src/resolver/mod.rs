//! Desired-set resolution: which absolute paths should be mirrored.
//!
//! The desired set is the union of tracked source files under the watch
//! directory and, for each external package those sources import, at most
//! one resolved type-declaration file. Resolution never propagates
//! failures: individual probe misses are skipped, and a catastrophic
//! discovery failure degrades to an empty set with an error log.

pub mod imports;
pub mod typings;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Directory names never descended into during source discovery.
const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "build", "target", "out"];

/// Optional richer source of files, externals, and declaration
/// candidates, supplied by a dependency-graph discovery collaborator.
/// When present its output is merged with the resolver's own probing.
pub trait DependencyGraph: Send + Sync {
    /// Additional absolute source paths to mirror.
    fn files(&self) -> Vec<PathBuf>;
    /// Additional external package names to resolve typings for.
    fn external_packages(&self) -> Vec<String>;
    /// Pre-discovered declaration candidates per package; these join the
    /// scored candidate pool rather than bypassing it.
    fn declaration_paths(&self) -> HashMap<String, Vec<PathBuf>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("source discovery failed under {dir}: {source}")]
    Discovery {
        dir: PathBuf,
        source: walkdir::Error,
    },
}

/// Computes the canonical set of absolute paths to mirror.
pub struct DesiredSetResolver {
    watch_dir: PathBuf,
    project_root: PathBuf,
    tracked_extensions: Vec<String>,
    graph: Option<Arc<dyn DependencyGraph>>,
}

impl DesiredSetResolver {
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        project_root: impl Into<PathBuf>,
        tracked_extensions: Vec<String>,
    ) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            project_root: project_root.into(),
            tracked_extensions,
            graph: None,
        }
    }

    pub fn with_graph(mut self, graph: Arc<dyn DependencyGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Compute the desired set. Degrades to empty on total failure.
    pub async fn compute(&self) -> HashSet<PathBuf> {
        match self.try_compute().await {
            Ok(set) => set,
            Err(e) => {
                tracing::error!("desired-set computation failed, degrading to empty: {}", e);
                HashSet::new()
            }
        }
    }

    async fn try_compute(&self) -> Result<HashSet<PathBuf>, ResolverError> {
        let mut sources = self.discover_sources()?;

        // Scan sources for bare imports; unreadable files are skipped.
        let mut packages = HashSet::new();
        for path in &sources {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => packages.extend(imports::bare_imports(&text)),
                Err(e) => {
                    tracing::warn!("skipping import scan of {}: {}", path.display(), e);
                }
            }
        }

        // Merge the dependency-graph collaborator's view, if configured.
        let mut graph_declarations: HashMap<String, Vec<PathBuf>> = HashMap::new();
        if let Some(graph) = &self.graph {
            sources.extend(graph.files());
            packages.extend(graph.external_packages());
            graph_declarations = graph.declaration_paths();
        }

        let source_dirs: HashSet<PathBuf> = sources
            .iter()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect();
        let roots = typings::candidate_roots(&source_dirs, &self.project_root);

        // At most one declaration file per package, chosen by score.
        let mut declarations: HashMap<String, PathBuf> = HashMap::new();
        for package in &packages {
            let mut candidates = typings::probe_package(&roots, package).await;
            if let Some(extra) = graph_declarations.get(package) {
                for path in extra {
                    if tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false) {
                        candidates.push(path.clone());
                    }
                }
            }
            match typings::pick_best(candidates) {
                Some(decl) => {
                    declarations.insert(package.clone(), decl);
                }
                None => {
                    tracing::debug!("no type declarations found for package {}", package);
                }
            }
        }

        let mut desired = sources;
        desired.extend(declarations.into_values());
        Ok(desired)
    }

    /// Walk the watch directory for files with tracked extensions.
    fn discover_sources(&self) -> Result<HashSet<PathBuf>, ResolverError> {
        let mut found = HashSet::new();
        let walker = WalkDir::new(&self.watch_dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    // A failure on the root itself is catastrophic; per-entry
                    // failures (permission, vanished file) are skipped.
                    if e.path() == Some(self.watch_dir.as_path()) || e.depth() == 0 {
                        return Err(ResolverError::Discovery {
                            dir: self.watch_dir.clone(),
                            source: e,
                        });
                    }
                    tracing::warn!("skipping unreadable entry during discovery: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_file() && self.is_tracked(entry.path()) {
                found.insert(entry.into_path());
            }
        }
        Ok(found)
    }

    fn is_tracked(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.tracked_extensions.iter().any(|t| t == ext))
            .unwrap_or(false)
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() || entry.depth() == 0 {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
        .unwrap_or(false)
}
