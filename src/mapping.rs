//! Many-to-many association between legacy source files and migrated target files.
//!
//! Mapping files use one canonical, versioned schema:
//!
//! ```json
//! { "version": 1,
//!   "entries": [ { "source": ["legacy/A.java"], "target": "src/main/java/B.java",
//!                  "sourceKind": "Service", "targetKind": "Service" } ] }
//! ```
//!
//! `source`/`target` take a single path or a list. The older `sourcePath`/`targetPath`
//! spelling and bare top-level arrays are rejected, not silently translated.
//! Paths are stored verbatim: callers canonicalize (relative, `/`-separated) before lookup.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const MAPPING_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub source_paths: Vec<String>,
    pub target_paths: Vec<String>,
    pub source_kind: String,
    pub target_kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawEntry {
    source: OneOrMany,
    target: OneOrMany,
    #[serde(default)]
    source_kind: Option<String>,
    #[serde(default)]
    target_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMappingFile {
    version: u32,
    entries: Vec<RawEntry>,
}

/// Bidirectional multimap, built once and read-only afterwards.
#[derive(Debug, Default)]
pub struct MappingIndex {
    entries: Vec<MappingEntry>,
    source_to_target: HashMap<String, Vec<String>>,
    target_to_source: HashMap<String, Vec<String>>,
}

impl MappingIndex {
    /// Build the index from already-validated entries.
    ///
    /// Every (source, target) pair of each entry's cross product is recorded once;
    /// repeated pairs collapse so lookups see each association a single time.
    pub fn load(entries: Vec<MappingEntry>) -> Self {
        let mut source_to_target: HashMap<String, Vec<String>> = HashMap::new();
        let mut target_to_source: HashMap<String, Vec<String>> = HashMap::new();

        for entry in &entries {
            for sp in &entry.source_paths {
                for tp in &entry.target_paths {
                    let targets = source_to_target.entry(sp.clone()).or_default();
                    if !targets.contains(tp) {
                        targets.push(tp.clone());
                    }
                    let sources = target_to_source.entry(tp.clone()).or_default();
                    if !sources.contains(sp) {
                        sources.push(sp.clone());
                    }
                }
            }
        }

        Self {
            entries,
            source_to_target,
            target_to_source,
        }
    }

    /// Parse a mapping document (see module docs for the schema).
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text).context("Mapping file is not valid JSON")?;
        if value.is_array() {
            bail!(
                "Unversioned mapping array is not supported; wrap it as {{\"version\": {MAPPING_SCHEMA_VERSION}, \"entries\": [...]}} using `source`/`target` keys"
            );
        }
        let raw: RawMappingFile = serde_json::from_value(value).context("Mapping file does not match the canonical schema")?;
        if raw.version != MAPPING_SCHEMA_VERSION {
            bail!(
                "Unsupported mapping schema version {} (expected {MAPPING_SCHEMA_VERSION})",
                raw.version
            );
        }

        let mut entries = Vec::with_capacity(raw.entries.len());
        for (i, e) in raw.entries.into_iter().enumerate() {
            let source_paths = e.source.into_vec();
            let target_paths = e.target.into_vec();
            if source_paths.is_empty() || target_paths.is_empty() {
                bail!("Mapping entry #{i} has an empty source or target list");
            }
            entries.push(MappingEntry {
                source_paths,
                target_paths,
                source_kind: e.source_kind.unwrap_or_else(|| "Unknown".to_string()),
                target_kind: e.target_kind.unwrap_or_else(|| "Unknown".to_string()),
            });
        }
        Ok(Self::load(entries))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid mapping file {}", path.display()))
    }

    /// Legacy files that produced `target`. Empty means "cannot repair, skip".
    pub fn sources_for(&self, target: &str) -> &[String] {
        self.target_to_source.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn targets_for(&self, source: &str) -> &[String] {
        self.source_to_target.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
