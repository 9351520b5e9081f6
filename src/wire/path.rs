//! Mapping between absolute filesystem paths and wire paths.
//!
//! In-root files map to `/`-prefixed project-relative paths and invert
//! algebraically. Files outside the project root are *virtualized*:
//!
//! - under some `node_modules`: `/.external/node_modules/<subpath>`, where
//!   the subpath is everything after the last `node_modules` component
//!   (this collapses `.pnpm` staging nesting to the package-visible path);
//! - anywhere else: `/.external/other/<token>_<basename>`, with a token
//!   derived deterministically from the absolute path.
//!
//! The forward mapping is a pure function of the absolute path. The token
//! is not invertible, so reversal of virtual paths goes through a
//! process-lifetime cache populated as a side effect of every forward
//! mapping. The cache can be rebuilt on demand from the set of currently
//! active paths (see [`WirePathCodec::rebuild_cache`]); a miss falls back
//! to a best-effort join under the project root, which is lossy and only
//! a last resort.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

/// Prefix for all virtualized (out-of-root) wire paths.
pub const EXTERNAL_PREFIX: &str = "/.external/";

/// Bidirectional path codec for one project root.
#[derive(Debug)]
pub struct WirePathCodec {
    project_root: PathBuf,
    /// Reverse index for virtual wire paths: wire path -> absolute path.
    virtual_cache: RwLock<HashMap<String, PathBuf>>,
}

impl WirePathCodec {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            virtual_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Map an absolute path to its wire representation.
    pub fn to_wire(&self, abs: &Path) -> String {
        if let Ok(rel) = abs.strip_prefix(&self.project_root) {
            return format!("/{}", posix(rel));
        }

        let wire = match subpath_after_last_node_modules(abs) {
            Some(sub) => format!("{}node_modules/{}", EXTERNAL_PREFIX, posix(&sub)),
            None => {
                let basename = abs
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unnamed".to_string());
                format!("{}other/{}_{}", EXTERNAL_PREFIX, path_token(abs), basename)
            }
        };

        self.virtual_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(wire.clone(), abs.to_path_buf());
        wire
    }

    /// Map a wire path back to an absolute path.
    ///
    /// In-root paths invert exactly. Virtual paths consult the cache; on a
    /// miss the path is reconstructed by joining the project root, which
    /// is not guaranteed to name a real file. Returns `None` for paths
    /// with `..` components: forward mapping never produces them, so they
    /// can only be an attempt to reach outside the project root.
    pub fn from_wire(&self, wire: &str) -> Option<PathBuf> {
        if escapes_root(wire) {
            return None;
        }
        if wire.starts_with(EXTERNAL_PREFIX) {
            if let Some(abs) = self
                .virtual_cache
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(wire)
            {
                return Some(abs.clone());
            }
            tracing::warn!(
                "no cached mapping for virtual path {}, reconstructing under project root",
                wire
            );
        }
        Some(self.project_root.join(wire.trim_start_matches('/')))
    }

    /// Repopulate the reverse index from the currently active paths.
    ///
    /// Forward mapping is pure, so running it over every active path
    /// restores all virtual mappings without persisted state. Called when
    /// a client reconnects against a freshly constructed codec.
    pub fn rebuild_cache<'a>(&self, active: impl IntoIterator<Item = &'a PathBuf>) {
        for path in active {
            let _ = self.to_wire(path);
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_mappings(&self) -> usize {
        self.virtual_cache.read().unwrap().len()
    }
}

/// True if any segment of the wire path is `..`.
fn escapes_root(wire: &str) -> bool {
    Path::new(wire)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

/// Render a relative path with `/` separators.
fn posix(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Everything after the last `node_modules` component, if any.
fn subpath_after_last_node_modules(abs: &Path) -> Option<PathBuf> {
    let components: Vec<_> = abs.components().collect();
    let last = components
        .iter()
        .rposition(|c| matches!(c, Component::Normal(p) if *p == "node_modules"))?;
    if last + 1 >= components.len() {
        return None;
    }
    Some(components[last + 1..].iter().collect())
}

/// Deterministic 16-character token for an arbitrary absolute path:
/// base64 of the path bytes, filtered to alphanumerics, truncated.
fn path_token(abs: &Path) -> String {
    let encoded = crate::b64::encode(abs.to_string_lossy().as_bytes());
    encoded
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_root_round_trip() {
        let codec = WirePathCodec::new("/home/user/project");
        let abs = PathBuf::from("/home/user/project/src/app.ts");
        let wire = codec.to_wire(&abs);
        assert_eq!(wire, "/src/app.ts");
        assert_eq!(codec.from_wire(&wire), Some(abs));
    }

    #[test]
    fn node_modules_path_is_virtualized() {
        let codec = WirePathCodec::new("/home/user/project");
        let abs = PathBuf::from("/opt/cache/node_modules/lodash/index.d.ts");
        let wire = codec.to_wire(&abs);
        assert_eq!(wire, "/.external/node_modules/lodash/index.d.ts");
        assert_eq!(codec.from_wire(&wire), Some(abs));
    }

    #[test]
    fn pnpm_nesting_collapses_to_last_node_modules() {
        let codec = WirePathCodec::new("/p");
        let abs = PathBuf::from(
            "/store/node_modules/.pnpm/lodash@4.17.21/node_modules/lodash/index.d.ts",
        );
        assert_eq!(
            codec.to_wire(&abs),
            "/.external/node_modules/lodash/index.d.ts"
        );
    }

    #[test]
    fn arbitrary_external_paths_are_distinct() {
        let codec = WirePathCodec::new("/p");
        let a = codec.to_wire(Path::new("/somewhere/else/types.d.ts"));
        let b = codec.to_wire(Path::new("/somewhere/other/types.d.ts"));
        assert!(a.starts_with("/.external/other/"));
        assert!(a.ends_with("_types.d.ts"));
        assert_ne!(a, b);
    }

    #[test]
    fn forward_mapping_is_pure() {
        let codec = WirePathCodec::new("/p");
        let abs = Path::new("/elsewhere/global.d.ts");
        assert_eq!(codec.to_wire(abs), codec.to_wire(abs));
    }

    #[test]
    fn cache_miss_falls_back_to_project_root_join() {
        let codec = WirePathCodec::new("/p");
        assert_eq!(
            codec.from_wire("/.external/other/abc_x.d.ts"),
            Some(PathBuf::from("/p/.external/other/abc_x.d.ts"))
        );
    }

    #[test]
    fn parent_components_are_rejected() {
        let codec = WirePathCodec::new("/srv/project");
        assert_eq!(codec.from_wire("/../../etc/passwd"), None);
        assert_eq!(codec.from_wire("/src/../../escape.ts"), None);
        assert_eq!(codec.from_wire("/.external/node_modules/../x"), None);
        // A dot-named file is not a traversal.
        assert!(codec.from_wire("/src/..config.ts").is_some());
    }

    #[test]
    fn poisoned_cache_lock_is_recovered() {
        use std::sync::Arc;

        let codec = Arc::new(WirePathCodec::new("/p"));
        let poisoner = Arc::clone(&codec);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.virtual_cache.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        let abs = PathBuf::from("/elsewhere/node_modules/react/index.d.ts");
        let wire = codec.to_wire(&abs);
        assert_eq!(codec.from_wire(&wire), Some(abs));
    }

    #[test]
    fn rebuild_cache_restores_virtual_mappings() {
        let first = WirePathCodec::new("/p");
        let abs = PathBuf::from("/elsewhere/node_modules/react/index.d.ts");
        let wire = first.to_wire(&abs);

        // A fresh codec (e.g. after restart) knows nothing.
        let second = WirePathCodec::new("/p");
        assert_eq!(second.cached_mappings(), 0);

        let active = vec![abs.clone()];
        second.rebuild_cache(active.iter());
        assert_eq!(second.from_wire(&wire), Some(abs));
    }
}
