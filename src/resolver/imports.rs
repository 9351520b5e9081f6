//! Bare import extraction from source text.
//!
//! A "bare" specifier names a package rather than a file: it starts with
//! neither `.` nor `/`. Runtime builtins (`node:fs`) are excluded up
//! front; anything else that fails to resolve is dropped later by the
//! typings probe, so no builtin allowlist is needed here.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)\b(?:import|export)\b[^'";]*?\bfrom\s*['"]([^'"]+)['"]"#).unwrap()
});

static SIDE_EFFECT_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)\bimport\s*['"]([^'"]+)['"]"#).unwrap());

static CALL_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b(?:require|import)\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

/// Extract the set of bare package names referenced by a source file.
///
/// Specifiers are reduced to their package name: the first path segment,
/// or the first two for scoped packages (`@scope/name/sub` -> `@scope/name`).
pub fn bare_imports(source: &str) -> HashSet<String> {
    let mut packages = HashSet::new();
    for re in [&*IMPORT_FROM, &*SIDE_EFFECT_IMPORT, &*CALL_IMPORT] {
        for cap in re.captures_iter(source) {
            if let Some(pkg) = package_name(&cap[1]) {
                packages.insert(pkg);
            }
        }
    }
    packages
}

/// Reduce a specifier to a package name, or `None` if it is not bare.
pub fn package_name(specifier: &str) -> Option<String> {
    if specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with("node:")
    {
        return None;
    }
    let mut segments = specifier.split('/');
    let first = segments.next()?;
    if first.starts_with('@') {
        let second = segments.next()?;
        Some(format!("{}/{}", first, second))
    } else {
        Some(first.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_import_forms() {
        let src = r#"
            import _ from "lodash";
            import { useState } from 'react';
            export { thing } from "some-lib/sub/path";
            import "./side-effect-local";
            import "polyfill-pkg";
            const fs = require("fs");
            const dyn = await import('dynamic-pkg');
        "#;
        let pkgs = bare_imports(src);
        assert!(pkgs.contains("lodash"));
        assert!(pkgs.contains("react"));
        assert!(pkgs.contains("some-lib"));
        assert!(pkgs.contains("polyfill-pkg"));
        assert!(pkgs.contains("dynamic-pkg"));
        assert!(pkgs.contains("fs"));
        assert!(!pkgs.iter().any(|p| p.starts_with('.')));
    }

    #[test]
    fn relative_and_builtin_specifiers_are_not_bare() {
        assert_eq!(package_name("./local"), None);
        assert_eq!(package_name("../up"), None);
        assert_eq!(package_name("/abs"), None);
        assert_eq!(package_name("node:fs"), None);
    }

    #[test]
    fn scoped_packages_keep_two_segments() {
        assert_eq!(
            package_name("@types/node/fs").as_deref(),
            Some("@types/node")
        );
        assert_eq!(package_name("@scope/pkg").as_deref(), Some("@scope/pkg"));
        // A lone scope is malformed.
        assert_eq!(package_name("@dangling"), None);
    }
}
