//! Record of what was last broadcast to connected clients.
//!
//! The registry is the engine's single source of truth for diffing: a path
//! is an "add" if absent here, a "change" if present with a different
//! fingerprint, and a "delete" if present here but gone from the desired
//! set. Entries are written the moment content is successfully read for
//! transmission and removed the moment a delete is confirmed, so the map
//! never drifts from what clients were actually sent.

use crate::hash::FileDigest;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// In-memory map of currently-mirrored path -> last-broadcast fingerprint.
#[derive(Debug, Default)]
pub struct ActiveRegistry {
    entries: HashMap<PathBuf, FileDigest>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&FileDigest> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: PathBuf, digest: FileDigest) {
        self.entries.insert(path, digest);
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileDigest> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All currently-mirrored absolute paths.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    /// Paths present here but absent from the desired set: the deletions
    /// for this cycle.
    pub fn stale_paths(&self, desired: &std::collections::HashSet<PathBuf>) -> Vec<PathBuf> {
        self.entries
            .keys()
            .filter(|p| !desired.contains(*p))
            .cloned()
            .collect()
    }
}
