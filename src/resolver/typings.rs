//! Type-declaration probing across candidate `node_modules` roots.
//!
//! For each external package the resolver wants at most one entry
//! declaration file. Candidates come from probing every plausible
//! `node_modules` root; when several roots yield a hit, a deterministic
//! score picks the winner so repeated runs resolve identically.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How many ancestor levels to walk when deriving candidate roots.
const MAX_ANCESTOR_LEVELS: usize = 8;

/// The subset of `package.json` the probe cares about.
#[derive(Debug, Deserialize)]
struct PackageManifest {
    types: Option<String>,
    typings: Option<String>,
}

/// Derive the deduplicated list of `node_modules` roots to probe:
/// ancestors of every source directory and of the project root, plus the
/// stable `server/node_modules` fallback.
pub fn candidate_roots(source_dirs: &HashSet<PathBuf>, project_root: &Path) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |root: PathBuf| {
        if seen.insert(root.clone()) {
            roots.push(root);
        }
    };

    for start in source_dirs.iter().map(PathBuf::as_path).chain([project_root]) {
        let mut dir = Some(start);
        for _ in 0..=MAX_ANCESTOR_LEVELS {
            let Some(d) = dir else { break };
            push(d.join("node_modules"));
            dir = d.parent();
        }
    }
    push(project_root.join("server").join("node_modules"));

    roots
}

/// Deterministic preference score for a declaration-file candidate.
/// Lower wins.
///
/// Preferences, strongest first: under `server/node_modules`; not under a
/// package-manager staging dir (`.pnpm`); under any `node_modules` at all.
/// Remaining ties break by shorter path.
pub fn score(path: &str) -> i32 {
    let mut score = 0;
    if path.contains("server/node_modules") {
        score -= 10;
    }
    if !path.contains(".pnpm") {
        score -= 3;
    }
    if path.contains("node_modules") {
        score -= 1;
    }
    score
}

/// Pick the best-scoring candidate, breaking ties by path length then
/// lexicographically for full determinism.
pub fn pick_best(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().min_by(|a, b| {
        let (sa, sb) = (a.to_string_lossy(), b.to_string_lossy());
        score(&sa)
            .cmp(&score(&sb))
            .then(sa.len().cmp(&sb.len()))
            .then(sa.cmp(&sb))
    })
}

/// Find every entry declaration file for `package` across the candidate
/// roots. Falls back to the `@types` naming convention when the package
/// itself ships no types anywhere.
pub async fn probe_package(roots: &[PathBuf], package: &str) -> Vec<PathBuf> {
    let direct = probe_named(roots, package).await;
    if !direct.is_empty() {
        return direct;
    }
    probe_named(roots, &types_package_name(package)).await
}

async fn probe_named(roots: &[PathBuf], package: &str) -> Vec<PathBuf> {
    let mut hits = Vec::new();
    for root in roots {
        let pkg_dir = root.join(package);
        if let Some(decl) = entry_declaration(&pkg_dir).await {
            hits.push(decl);
        }
    }
    hits
}

/// The entry declaration file of one package directory, probed in
/// priority order: manifest `types`/`typings` field, `index.d.ts`,
/// `dist/index.d.ts`. Any read or parse failure just disqualifies that
/// step.
async fn entry_declaration(pkg_dir: &Path) -> Option<PathBuf> {
    if let Ok(raw) = tokio::fs::read_to_string(pkg_dir.join("package.json")).await {
        if let Ok(manifest) = serde_json::from_str::<PackageManifest>(&raw) {
            if let Some(entry) = manifest.types.or(manifest.typings) {
                let candidate = pkg_dir.join(entry);
                if is_file(&candidate).await {
                    return Some(candidate);
                }
            }
        }
    }
    for fallback in ["index.d.ts", "dist/index.d.ts"] {
        let candidate = pkg_dir.join(fallback);
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// DefinitelyTyped naming: `lodash` -> `@types/lodash`,
/// `@scope/pkg` -> `@types/scope__pkg`.
fn types_package_name(package: &str) -> String {
    match package.strip_prefix('@') {
        Some(scoped) => format!("@types/{}", scoped.replace('/', "__")),
        None => format!("@types/{}", package),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_prefers_server_node_modules() {
        let server = "/p/server/node_modules/lodash/index.d.ts";
        let plain = "/p/node_modules/lodash/index.d.ts";
        assert!(score(server) < score(plain));
    }

    #[test]
    fn score_penalizes_pnpm_staging() {
        let pnpm = "/p/node_modules/.pnpm/lodash@1/node_modules/lodash/index.d.ts";
        let plain = "/p/node_modules/lodash/index.d.ts";
        assert!(score(plain) < score(pnpm));
    }

    #[test]
    fn score_prefers_node_modules_over_loose_paths() {
        assert!(score("/p/node_modules/x/index.d.ts") < score("/p/types/x/index.d.ts"));
    }

    #[test]
    fn pick_best_breaks_ties_by_length() {
        let best = pick_best(vec![
            PathBuf::from("/p/node_modules/pkg/dist/index.d.ts"),
            PathBuf::from("/p/node_modules/pkg/index.d.ts"),
        ]);
        assert_eq!(best, Some(PathBuf::from("/p/node_modules/pkg/index.d.ts")));
    }

    #[test]
    fn types_naming_mangles_scopes() {
        assert_eq!(types_package_name("lodash"), "@types/lodash");
        assert_eq!(types_package_name("@babel/core"), "@types/babel__core");
    }

    #[test]
    fn candidate_roots_walk_ancestors_and_include_fallback() {
        let dirs: HashSet<PathBuf> = [PathBuf::from("/p/src/components")].into_iter().collect();
        let roots = candidate_roots(&dirs, Path::new("/p"));
        assert!(roots.contains(&PathBuf::from("/p/src/components/node_modules")));
        assert!(roots.contains(&PathBuf::from("/p/src/node_modules")));
        assert!(roots.contains(&PathBuf::from("/p/node_modules")));
        assert!(roots.contains(&PathBuf::from("/p/server/node_modules")));
        // Deduplicated.
        let unique: HashSet<_> = roots.iter().collect();
        assert_eq!(unique.len(), roots.len());
    }

    #[tokio::test]
    async fn probe_reads_manifest_types_field() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("node_modules/widgets");
        tokio::fs::create_dir_all(pkg.join("lib")).await.unwrap();
        tokio::fs::write(
            pkg.join("package.json"),
            r#"{"name":"widgets","types":"lib/main.d.ts"}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(pkg.join("lib/main.d.ts"), "export {};")
            .await
            .unwrap();

        let roots = vec![dir.path().join("node_modules")];
        let hits = probe_package(&roots, "widgets").await;
        assert_eq!(hits, vec![pkg.join("lib/main.d.ts")]);
    }

    #[tokio::test]
    async fn probe_falls_back_to_types_package() {
        let dir = tempfile::tempdir().unwrap();
        let types_pkg = dir.path().join("node_modules/@types/lodash");
        tokio::fs::create_dir_all(&types_pkg).await.unwrap();
        tokio::fs::write(types_pkg.join("index.d.ts"), "export {};")
            .await
            .unwrap();

        let roots = vec![dir.path().join("node_modules")];
        let hits = probe_package(&roots, "lodash").await;
        assert_eq!(hits, vec![types_pkg.join("index.d.ts")]);
    }

    #[tokio::test]
    async fn probe_misses_are_empty_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let roots = vec![dir.path().join("node_modules")];
        assert!(probe_package(&roots, "ghost-package").await.is_empty());
    }
}
