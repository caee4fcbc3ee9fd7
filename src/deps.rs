use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyFixOutcome {
    /// Dependency lines inserted into the build file, sorted.
    Fixed(Vec<String>),
    Skipped(String),
}

fn missing_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"symbol:\s+class\s+(\w+)").unwrap())
}

fn missing_package_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"package\s+([\w.]+)\s+does not exist").unwrap())
}

fn dependencies_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*dependencies\s*\{[ \t]*\n?").unwrap())
}

/// Class names the compiler could not resolve, in sorted order.
///
/// For a missing package only its last segment is kept, so
/// `package javax.persistence does not exist` yields `persistence`.
pub fn missing_classes(build_output: &str) -> BTreeSet<String> {
    let mut out: BTreeSet<String> = missing_class_re()
        .captures_iter(build_output)
        .map(|c| c[1].to_string())
        .collect();
    for cap in missing_package_re().captures_iter(build_output) {
        if let Some(last) = cap[1].rsplit('.').next() {
            out.insert(last.to_string());
        }
    }
    out
}

/// Coarse, whole-build repair: add build-file dependencies for unresolved classes.
#[derive(Debug, Clone)]
pub struct DependencyFixer {
    build_file: PathBuf,
    suggestions: BTreeMap<String, String>,
}

impl DependencyFixer {
    pub fn new(migrated_root: &Path, build_file: &str, suggestions: BTreeMap<String, String>) -> Self {
        Self {
            build_file: migrated_root.join(build_file),
            suggestions,
        }
    }

    pub fn fix(&self, build_output: &str) -> Result<DependencyFixOutcome> {
        if !self.build_file.is_file() {
            return Ok(DependencyFixOutcome::Skipped("No build file".into()));
        }
        let missing = missing_classes(build_output);
        if missing.is_empty() {
            return Ok(DependencyFixOutcome::Skipped("No missing classes in build output".into()));
        }

        let text = fs::read_to_string(&self.build_file)
            .with_context(|| format!("Failed to read {}", self.build_file.display()))?;

        let wanted: BTreeSet<&str> = missing
            .iter()
            .filter_map(|class| self.suggestions.get(class))
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !text.contains(line))
            .collect();
        if wanted.is_empty() {
            return Ok(DependencyFixOutcome::Skipped(format!(
                "No new dependency for {}",
                missing.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        let Some(block) = dependencies_block_re().find(&text) else {
            return Ok(DependencyFixOutcome::Skipped("No dependencies block in build file".into()));
        };
        let mut insert = String::new();
        if !text[..block.end()].ends_with('\n') {
            insert.push('\n');
        }
        for line in &wanted {
            insert.push_str("    ");
            insert.push_str(line);
            insert.push('\n');
        }
        let updated = format!("{}{}{}", &text[..block.end()], insert, &text[block.end()..]);
        fs::write(&self.build_file, updated)
            .with_context(|| format!("Failed to write {}", self.build_file.display()))?;

        let added: Vec<String> = wanted.into_iter().map(str::to_string).collect();
        log::info!("added {} dependencies to {}", added.len(), self.build_file.display());
        Ok(DependencyFixOutcome::Fixed(added))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use tempfile::TempDir;

    const OUTPUT: &str = "B.java:3: error: cannot find symbol\n  symbol:   class RestController\n\
C.java:1: error: package org.slf4j does not exist\n\
D.java:4: error: cannot find symbol\n  symbol:   class Widget\n";

    const GRADLE: &str = "plugins {\n    id 'java'\n}\n\ndependencies {\n    implementation 'org.slf4j:slf4j-api:2.0.9'\n}\n";

    fn suggestions() -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert(
            "RestController".to_string(),
            "implementation 'org.springframework.boot:spring-boot-starter-web'".to_string(),
        );
        m.insert("slf4j".to_string(), "implementation 'org.slf4j:slf4j-api:2.0.9'".to_string());
        m
    }

    #[test]
    fn extracts_classes_and_package_tails() {
        let found: Vec<String> = missing_classes(OUTPUT).into_iter().collect();
        assert_eq!(found, vec!["RestController", "Widget", "slf4j"]);
    }

    #[test]
    fn inserts_only_new_suggestions_after_dependencies_line() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("build.gradle"), GRADLE).unwrap();
        let fixer = DependencyFixer::new(tmp.path(), "build.gradle", suggestions());

        let out = fixer.fix(OUTPUT).unwrap();
        assert_eq!(
            out,
            DependencyFixOutcome::Fixed(vec!["implementation 'org.springframework.boot:spring-boot-starter-web'".into()])
        );
        let text = fs::read_to_string(tmp.path().join("build.gradle")).unwrap();
        assert!(text.contains(
            "dependencies {\n    implementation 'org.springframework.boot:spring-boot-starter-web'\n    implementation 'org.slf4j:slf4j-api:2.0.9'\n}"
        ));

        // Second run has nothing left to add.
        assert!(matches!(fixer.fix(OUTPUT).unwrap(), DependencyFixOutcome::Skipped(_)));
    }

    #[test]
    fn no_build_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let fixer = DependencyFixer::new(tmp.path(), "build.gradle", suggestions());
        assert_eq!(fixer.fix(OUTPUT).unwrap(), DependencyFixOutcome::Skipped("No build file".into()));
    }

    #[test]
    fn unknown_classes_and_missing_block_are_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("build.gradle"), "plugins { id 'java' }\n").unwrap();
        let fixer = DependencyFixer::new(tmp.path(), "build.gradle", suggestions());
        assert!(matches!(
            fixer.fix("symbol: class Widget").unwrap(),
            DependencyFixOutcome::Skipped(r) if r.contains("Widget")
        ));
        assert_eq!(
            fixer.fix("symbol: class RestController").unwrap(),
            DependencyFixOutcome::Skipped("No dependencies block in build file".into())
        );
    }

    #[test]
    fn default_table_covers_spring_web() {
        let cfg = BuildConfig::default();
        assert!(cfg.dependency_suggestions.contains_key("RestController"));
    }
}
