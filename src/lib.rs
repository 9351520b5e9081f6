//! mirrorsync: incremental file synchronization engine.
//!
//! Watches a directory tree, resolves the set of files that should be
//! mirrored (tracked sources plus one type-declaration file per external
//! package they import), diffs it against the last-broadcast state, and
//! streams adds/changes/deletes to connected WebSocket clients. Clients
//! can push writes and deletes back; those are applied to the filesystem
//! and re-validated through the same recompute path (two-way sync,
//! last-write-wins).

pub mod b64;
pub mod cli;
pub mod engine;
pub mod hash;
pub mod registry;
pub mod resolver;
pub mod wire;
pub mod ws;

pub use engine::{SyncConfig, SyncEngine};
pub use resolver::{DependencyGraph, DesiredSetResolver};
pub use wire::{ChangeEvent, ClientEvent, ClientMessage, InitialFile, ServerMessage, WirePathCodec};
