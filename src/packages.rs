use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::scanner::{scan_tree, ScanOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeOutcome {
    /// The package the file now declares.
    Updated(String),
    Unchanged(String),
    Skipped(String),
}

fn package_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*package\s+[\w.]+\s*;[ \t]*\r?\n?").unwrap())
}

/// Package implied by a `/`-separated relative path.
///
/// Uses the directories after the last `java/` or `output/` segment when one
/// exists, otherwise every directory of `rel_path`.
pub fn derive_package(rel_path: &str, base_package: &str) -> String {
    let rel = rel_path.replace('\\', "/");
    let dir = match rel.rfind('/') {
        Some(i) => &rel[..i],
        None => "",
    };
    let segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let start = segments
        .iter()
        .rposition(|s| *s == "java" || *s == "output")
        .map(|i| i + 1)
        .unwrap_or(0);
    let tail = segments[start..].join(".");

    let base = base_package.trim_matches('.');
    [base, tail.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

/// Rewrite the `package` line of one Java file to match its location.
pub fn normalize_file(migrated_root: &Path, rel_path: &str, base_package: &str) -> Result<NormalizeOutcome> {
    let path = migrated_root.join(rel_path);
    if !path.is_file() {
        return Ok(NormalizeOutcome::Skipped(format!("{rel_path}: file not found")));
    }
    let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;

    let package = derive_package(rel_path, base_package);
    let body = package_decl_re().replace_all(&text, "");
    let body = body.trim_start_matches(['\n', '\r']);
    let updated = if package.is_empty() {
        body.to_string()
    } else {
        format!("package {package};\n\n{body}")
    };

    if updated == text {
        return Ok(NormalizeOutcome::Unchanged(package));
    }
    fs::write(&path, updated).with_context(|| format!("Failed to write {}", path.display()))?;
    log::debug!("{rel_path}: package set to {package:?}");
    Ok(NormalizeOutcome::Updated(package))
}

/// Normalize every `.java` file under `migrated_root`. Returns the number of files rewritten.
pub fn normalize_tree(migrated_root: &Path, base_package: &str) -> Result<usize> {
    let mut updated = 0;
    for entry in scan_tree(&ScanOptions::new(migrated_root, &[".java"]))? {
        match normalize_file(migrated_root, &entry.rel_path, base_package)? {
            NormalizeOutcome::Updated(_) => updated += 1,
            NormalizeOutcome::Unchanged(_) => {}
            NormalizeOutcome::Skipped(reason) => log::warn!("{reason}"),
        }
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn package_comes_from_path_after_java_or_output() {
        assert_eq!(derive_package("src/main/java/user/UserService.java", "com.acme"), "com.acme.user");
        assert_eq!(derive_package("output/billing/api/Invoice.java", "com.acme."), "com.acme.billing.api");
        assert_eq!(derive_package("order/Order.java", "com.acme"), "com.acme.order");
        assert_eq!(derive_package("Main.java", "com.acme"), "com.acme");
        assert_eq!(derive_package("web/Ctl.java", ""), "web");
    }

    #[test]
    fn replaces_existing_declaration() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("src/main/java/user");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("User.java"), "package wrong.place;\n\nimport java.util.List;\n\nclass User {}\n").unwrap();

        let out = normalize_file(tmp.path(), "src/main/java/user/User.java", "com.acme").unwrap();
        assert_eq!(out, NormalizeOutcome::Updated("com.acme.user".into()));
        assert_eq!(
            fs::read_to_string(dir.join("User.java")).unwrap(),
            "package com.acme.user;\n\nimport java.util.List;\n\nclass User {}\n"
        );

        let again = normalize_file(tmp.path(), "src/main/java/user/User.java", "com.acme").unwrap();
        assert_eq!(again, NormalizeOutcome::Unchanged("com.acme.user".into()));
    }

    #[test]
    fn missing_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            normalize_file(tmp.path(), "Nope.java", "com.acme").unwrap(),
            NormalizeOutcome::Skipped(_)
        ));
    }

    #[test]
    fn tree_walk_counts_rewrites() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::write(tmp.path().join("a/A.java"), "class A {}\n").unwrap();
        fs::write(tmp.path().join("B.java"), "package com.acme;\n\nclass B {}\n").unwrap();
        assert_eq!(normalize_tree(tmp.path(), "com.acme").unwrap(), 1);
        assert_eq!(
            fs::read_to_string(tmp.path().join("a/A.java")).unwrap(),
            "package com.acme.a;\n\nclass A {}\n"
        );
    }
}
