use anyhow::{Context, Result};
use glob::Pattern;
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Hard safety ceiling: files larger than this are never read into a repair context
/// or an embedding request.
pub const ABSOLUTE_MAX_FILE_BYTES: u64 = 1_000_000;

fn default_overrides(root: &Path, exclude_dir_names: &[String]) -> Result<Override> {
    let mut ob = OverrideBuilder::new(root);

    // Build outputs and tool state never belong to a corpus.
    // For directories, add both the entry and its descendants so the walker does not descend.
    for d in [
        ".git",
        "node_modules",
        "target",
        "build",
        "out",
        ".gradle",
        ".idea",
        ".vscode",
        ".migrafix",
    ] {
        ob.add(&format!("!**/{d}"))?;
        ob.add(&format!("!**/{d}/**"))?;
    }

    for d in exclude_dir_names {
        let d = d.trim().trim_matches('/');
        if d.is_empty() {
            continue;
        }
        ob.add(&format!("!**/{d}"))?;
        ob.add(&format!("!**/{d}/**"))?;
    }

    Ok(ob.build()?)
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub abs_path: PathBuf,
    /// Relative to the scan root, always `/`-separated.
    pub rel_path: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    /// Extensions with the leading dot (".java"). Empty means any extension.
    pub extensions: Vec<String>,
    /// Glob patterns matched against `rel_path`. Empty means everything.
    pub include: Vec<String>,
    pub exclude_dir_names: Vec<String>,
    pub max_file_bytes: u64,
}

impl ScanOptions {
    pub fn new(root: &Path, extensions: &[&str]) -> Self {
        Self {
            root: root.to_path_buf(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            include: vec![],
            exclude_dir_names: vec![],
            max_file_bytes: ABSOLUTE_MAX_FILE_BYTES,
        }
    }

    fn accepts(&self, rel_path: &str, include: &[Pattern]) -> bool {
        let ext_ok = self.extensions.is_empty()
            || self.extensions.iter().any(|ext| rel_path.ends_with(ext.as_str()));
        let include_ok = include.is_empty() || include.iter().any(|p| p.matches(rel_path));
        ext_ok && include_ok
    }
}

/// Walk `opts.root` and return matching files sorted by relative path.
///
/// Hidden files and `.gitignore`d paths are skipped, as are empty and oversized files.
pub fn scan_tree(opts: &ScanOptions) -> Result<Vec<FileEntry>> {
    let meta = std::fs::metadata(&opts.root)
        .with_context(|| format!("Scan root does not exist: {}", opts.root.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("Scan root is not a directory: {}", opts.root.display());
    }

    let include: Vec<Pattern> = opts
        .include
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pat) => Some(pat),
            Err(e) => {
                log::warn!("ignoring invalid include pattern {p:?}: {e}");
                None
            }
        })
        .collect();

    let overrides = default_overrides(&opts.root, &opts.exclude_dir_names)?;
    let walker = WalkBuilder::new(&opts.root)
        .standard_filters(true)
        .require_git(false)
        .overrides(overrides)
        .build();

    let max_bytes = opts.max_file_bytes.min(ABSOLUTE_MAX_FILE_BYTES);
    let mut entries = Vec::new();
    for item in walker {
        let dent = match item {
            Ok(d) => d,
            Err(e) => {
                log::debug!("walk error under {}: {e}", opts.root.display());
                continue;
            }
        };
        if !dent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let abs_path = dent.into_path();
        let Some(rel_path) = rel_slash_path(&abs_path, &opts.root) else {
            continue;
        };
        if !opts.accepts(&rel_path, &include) {
            continue;
        }

        let bytes = match std::fs::metadata(&abs_path).map(|m| m.len()) {
            Ok(b) => b,
            Err(_) => continue,
        };
        if bytes == 0 || bytes > max_bytes {
            continue;
        }

        entries.push(FileEntry { abs_path, rel_path, bytes });
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

/// `path` relative to `base`, with `/` separators. `None` when `path` is outside `base`.
pub fn rel_slash_path(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}
