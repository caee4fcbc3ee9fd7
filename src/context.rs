use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::{estimate_tokens, estimate_tokens_from_chars, ContextConfig, LegacyMode};
use crate::error::RepairError;
use crate::heuristics::{called_method_names, extract_method_declarations, imports};
use crate::scanner::{scan_tree, ScanOptions};
use crate::vector_store::SimilarityIndex;

/// The four text blobs handed to the oracle for one repair attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairContext {
    pub legacy_text: String,
    pub enterprise_text: String,
    pub reference_text: String,
    pub target_text: String,
}

impl RepairContext {
    pub fn total_chars(&self) -> usize {
        self.legacy_text.chars().count()
            + self.enterprise_text.chars().count()
            + self.reference_text.chars().count()
            + self.target_text.chars().count()
    }

    pub fn estimated_tokens(&self, chars_per_token: usize) -> usize {
        estimate_tokens_from_chars(self.total_chars(), chars_per_token)
    }
}

/// Resolves `import a.b.C;` lines to files under the enterprise root.
#[derive(Debug, Default)]
pub struct EnterpriseCatalog {
    /// Relative paths of every `.java` file, `/`-separated.
    files: Vec<String>,
}

impl EnterpriseCatalog {
    pub fn scan(root: &Path) -> Result<Self> {
        let files = scan_tree(&ScanOptions::new(root, &[".java"]))?
            .into_iter()
            .map(|e| e.rel_path)
            .collect();
        Ok(Self { files })
    }

    /// Enterprise files imported by `target_text`, in import order, deduplicated.
    pub fn refs_for(&self, target_text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for import in imports(target_text) {
            let suffix = format!("{}.java", import.replace('.', "/"));
            for f in &self.files {
                let hit = f == &suffix || f.ends_with(&format!("/{suffix}"));
                if hit && !out.contains(f) {
                    out.push(f.clone());
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub struct ContextAssembler {
    legacy_root: PathBuf,
    migrated_root: PathBuf,
    enterprise_root: Option<PathBuf>,
    similarity: Option<SimilarityIndex>,
    settings: ContextConfig,
    chars_per_token: usize,
}

impl ContextAssembler {
    pub fn new(legacy_root: &Path, migrated_root: &Path, settings: ContextConfig, chars_per_token: usize) -> Self {
        Self {
            legacy_root: legacy_root.to_path_buf(),
            migrated_root: migrated_root.to_path_buf(),
            enterprise_root: None,
            similarity: None,
            settings,
            chars_per_token,
        }
    }

    pub fn with_enterprise_root(mut self, root: Option<&Path>) -> Self {
        self.enterprise_root = root.map(Path::to_path_buf);
        self
    }

    pub fn with_similarity(mut self, index: Option<SimilarityIndex>) -> Self {
        self.similarity = index;
        self
    }

    pub fn migrated_root(&self) -> &Path {
        &self.migrated_root
    }

    fn read_or_placeholder(path: &Path, label: &str) -> String {
        match std::fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => format!("// FILE NOT FOUND: {label}\n"),
        }
    }

    fn legacy_chunk(&self, source: &str, target_text: &str) -> String {
        let text = Self::read_or_placeholder(&self.legacy_root.join(source), source);
        let body = match self.settings.legacy_mode {
            LegacyMode::Full => text,
            LegacyMode::CalledMethods => {
                let decls = extract_method_declarations(&text, &called_method_names(target_text));
                if decls.is_empty() {
                    text
                } else {
                    decls.join("\n\n")
                }
            }
        };
        format!("// Source: {source}\n{body}")
    }

    fn reference_text(&self, target_text: &str) -> String {
        let Some(index) = self.similarity.as_ref() else {
            return String::new();
        };
        let budget = self.settings.max_reference_tokens;
        let hits = index.query(target_text, self.settings.reference_top_k, budget);

        let mut used = 0usize;
        let mut chunks = Vec::new();
        for hit in hits {
            let chunk = format!("// Reference: {}\n{}", hit.path, hit.content);
            let tokens = estimate_tokens(&chunk, self.chars_per_token);
            if used + tokens > budget {
                continue;
            }
            used += tokens;
            chunks.push(chunk);
        }
        chunks.join("\n\n")
    }

    /// Assemble the repair context for `target` (relative to the migrated root).
    ///
    /// Legacy chunks follow the order of `sources`. A missing target is an error;
    /// a context over `max_total_tokens` is `ContextTooLarge`, never truncated.
    pub fn build(&self, target: &str, sources: &[String], enterprise_refs: &[String]) -> Result<RepairContext, RepairError> {
        let target_path = self.migrated_root.join(target);
        if !target_path.is_file() {
            return Err(RepairError::TargetNotFound);
        }
        let target_text = String::from_utf8_lossy(&std::fs::read(&target_path)?).into_owned();

        let legacy_text = sources
            .iter()
            .map(|s| self.legacy_chunk(s, &target_text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let enterprise_text = match self.enterprise_root.as_ref() {
            Some(root) if !enterprise_refs.is_empty() => enterprise_refs
                .iter()
                .map(|r| format!("// Enterprise: {r}\n{}", Self::read_or_placeholder(&root.join(r), r)))
                .collect::<Vec<_>>()
                .join("\n\n"),
            _ => String::new(),
        };

        let reference_text = self.reference_text(&target_text);

        let ctx = RepairContext {
            legacy_text,
            enterprise_text,
            reference_text,
            target_text,
        };
        let tokens = ctx.estimated_tokens(self.chars_per_token);
        if tokens > self.settings.max_total_tokens {
            return Err(RepairError::ContextTooLarge {
                tokens,
                limit: self.settings.max_total_tokens,
            });
        }
        Ok(ctx)
    }
}
