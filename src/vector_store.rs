use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::estimate_tokens;
use crate::embedder::Embedder;
use crate::scanner::{scan_tree, ScanOptions};

// ---------------------------------------------------------------------------
// Flat-file embedding cache for the reference corpus. No external database.
//
// Storage layout:  <cache_path>
//   { "entries": { "<rel_path>": { "hash": "<xxh3 hex>", "vector": [f32, ...] } } }
//
// Staleness is content-addressed: an entry is reused iff its stored hash equals
// the hash of the file's current content. The file is read fully at open and
// rewritten fully (tmp + rename) after an index update. One writer at a time.
//
// Search: brute-force cosine similarity over every cached record.
// ---------------------------------------------------------------------------

/// Longest prefix of a file sent to the embedding oracle.
const MAX_EMBED_CHARS: usize = 16_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    hash: String,
    vector: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EmbeddingCache {
    entries: BTreeMap<String, CacheEntry>,
}

/// One cached embedding, as seen from outside the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub path: String,
    pub content_hash: String,
    pub vector: Vec<f32>,
}

impl EmbeddingCache {
    /// Read the cache. A missing file is an empty cache; a corrupt one is
    /// logged and rebuilt from scratch.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Self>(&text) {
            Ok(cache) => cache,
            Err(e) => {
                log::warn!("embedding cache {} is corrupted ({e}), rebuilding", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string(self).context("Failed to serialize embedding cache")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to rename embedding cache to {}", path.display()))?;
        Ok(())
    }

    pub fn record(&self, path: &str) -> Option<EmbeddingRecord> {
        self.entries.get(path).map(|e| EmbeddingRecord {
            path: path.to_string(),
            content_hash: e.hash.clone(),
            vector: e.vector.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn content_hash(content: &str) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(content.as_bytes()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub scanned: usize,
    pub embedded: usize,
    pub reused: usize,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceHit {
    /// Relative to the corpus root.
    pub path: String,
    pub content: String,
    pub score: f32,
}

pub struct SimilarityIndex {
    corpus_root: PathBuf,
    cache_path: PathBuf,
    cache: EmbeddingCache,
    embedder: Box<dyn Embedder>,
    chars_per_token: usize,
}

impl SimilarityIndex {
    pub fn new(
        corpus_root: &Path,
        cache: EmbeddingCache,
        cache_path: &Path,
        embedder: Box<dyn Embedder>,
        chars_per_token: usize,
    ) -> Self {
        Self {
            corpus_root: corpus_root.to_path_buf(),
            cache_path: cache_path.to_path_buf(),
            cache,
            embedder,
            chars_per_token,
        }
    }

    /// Load the cache from `cache_path` and wrap it.
    pub fn open(corpus_root: &Path, cache_path: &Path, embedder: Box<dyn Embedder>, chars_per_token: usize) -> Self {
        let cache = EmbeddingCache::load(cache_path);
        Self::new(corpus_root, cache, cache_path, embedder, chars_per_token)
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    fn read_text(abs_path: &Path) -> Option<String> {
        let bytes = std::fs::read(abs_path).ok()?;
        // Null bytes → binary, never embedded.
        if bytes.contains(&0u8) {
            return None;
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Bring the cache up to date with the corpus on disk and persist it.
    ///
    ///  1. Walk the corpus (recognised extensions only).
    ///  2. Read + hash every file in parallel.
    ///  3. Reuse entries whose hash matches; embed the rest sequentially.
    ///  4. Drop entries for files that disappeared; save once if anything changed.
    ///
    /// A failed embedding call leaves that file out of the cache and is counted in `failed`.
    pub fn build_index(&mut self, opts: &ScanOptions) -> Result<IndexStats> {
        let files = scan_tree(opts)?;
        let mut stats = IndexStats {
            scanned: files.len(),
            ..IndexStats::default()
        };

        let hashed: Vec<(String, String, String)> = files
            .par_iter()
            .filter_map(|f| {
                let content = Self::read_text(&f.abs_path)?;
                let hash = content_hash(&content);
                Some((f.rel_path.clone(), hash, content))
            })
            .collect();

        let on_disk: HashSet<&str> = hashed.iter().map(|(rel, _, _)| rel.as_str()).collect();
        let stale: Vec<String> = self
            .cache
            .entries
            .keys()
            .filter(|k| !on_disk.contains(k.as_str()))
            .cloned()
            .collect();

        for (rel, hash, content) in &hashed {
            if self.cache.entries.get(rel).is_some_and(|e| &e.hash == hash) {
                stats.reused += 1;
                continue;
            }
            let input: String = content.chars().take(MAX_EMBED_CHARS).collect();
            match self.embedder.embed(&input) {
                Ok(vector) => {
                    self.cache.entries.insert(rel.clone(), CacheEntry { hash: hash.clone(), vector });
                    stats.embedded += 1;
                }
                Err(e) => {
                    log::warn!("failed to embed reference file {rel}: {e:#}");
                    stats.failed += 1;
                }
            }
        }

        for key in &stale {
            self.cache.entries.remove(key);
        }
        stats.removed = stale.len();

        if stats.embedded > 0 || stats.removed > 0 {
            self.cache.save(&self.cache_path)?;
            log::info!(
                "reference index updated: +{} reused {} removed {}",
                stats.embedded,
                stats.reused,
                stats.removed
            );
        } else {
            log::info!("reference embedding cache is up to date ({} files)", stats.reused);
        }
        Ok(stats)
    }

    /// Top-`top_k` corpus files most similar to `text`, skipping any whose
    /// content is estimated above `max_tokens`.
    ///
    /// Ordered by non-increasing cosine similarity; ties keep cache order.
    /// An embedding failure yields an empty list, never an error.
    pub fn query(&self, text: &str, top_k: usize, max_tokens: usize) -> Vec<ReferenceHit> {
        if top_k == 0 || self.cache.is_empty() {
            return vec![];
        }
        let query_vec = match self.embedder.embed(text) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("embedding failed for reference query: {e:#}");
                return vec![];
            }
        };

        let mut scored: Vec<ReferenceHit> = Vec::new();
        for (path, entry) in &self.cache.entries {
            let Some(content) = Self::read_text(&self.corpus_root.join(path)) else {
                continue;
            };
            if estimate_tokens(&content, self.chars_per_token) > max_tokens {
                continue;
            }
            scored.push(ReferenceHit {
                path: path.clone(),
                content,
                score: cosine_similarity(&query_vec, &entry.vector),
            });
        }

        rank_hits(&mut scored);
        scored.truncate(top_k);
        scored
    }
}

/// Highest score first. `sort_by` is stable, so equal scores keep cache
/// iteration order; `total_cmp` keeps the order total even for NaN.
fn rank_hits(hits: &mut [ReferenceHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
}

// ---------------------------------------------------------------------------
// Math helpers
// ---------------------------------------------------------------------------

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = dot / (norm_a * norm_b);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
