use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of one repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Success,
    Failed,
    Skipped,
}

impl FixStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FixStatus::Success => "success",
            FixStatus::Failed => "failed",
            FixStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixLogEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub status: FixStatus,
    /// Capped at the history's `cap_chars`.
    pub original_text: String,
    /// Capped at the history's `cap_chars`; absent when nothing was written.
    pub fixed_text: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Append-only, per-target-file repair log.
///
/// Layout: `<log_dir>/<encoded target path>.json`, each file a JSON array of
/// [`FixLogEntry`]. See [`FixHistory::log_path`] for the name encoding.
#[derive(Debug, Clone)]
pub struct FixHistory {
    log_dir: PathBuf,
    cap_chars: usize,
}

pub fn cap_text(text: &str, cap_chars: usize) -> String {
    text.chars().take(cap_chars).collect()
}

impl FixHistory {
    pub fn new(log_dir: &Path, cap_chars: usize) -> Self {
        Self {
            log_dir: log_dir.to_path_buf(),
            cap_chars,
        }
    }

    /// `%` and `_` are percent-escaped before path separators become `__`, so
    /// `a/b.java` and `a__b.java` get distinct logs. Names without either
    /// character are kept as is.
    pub fn log_path(&self, file: &str) -> PathBuf {
        let mut name = String::with_capacity(file.len());
        for ch in file.chars() {
            match ch {
                '%' => name.push_str("%25"),
                '_' => name.push_str("%5F"),
                '/' | '\\' => name.push_str("__"),
                c => name.push(c),
            }
        }
        self.log_dir.join(format!("{name}.json"))
    }

    /// All entries for `file`, oldest first. No log yet means an empty history.
    pub fn entries(&self, file: &str) -> Result<Vec<FixLogEntry>> {
        let path = self.log_path(file);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        serde_json::from_str(&text).with_context(|| format!("Corrupt fix history {}", path.display()))
    }

    /// Append one entry for `file`. Texts are capped before they are stored.
    pub fn record(
        &self,
        file: &str,
        agent: &str,
        status: FixStatus,
        original_text: &str,
        fixed_text: Option<&str>,
        metadata: Map<String, Value>,
    ) -> Result<FixLogEntry> {
        let entry = FixLogEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            status,
            original_text: cap_text(original_text, self.cap_chars),
            fixed_text: fixed_text.map(|t| cap_text(t, self.cap_chars)),
            metadata,
        };

        let final_path = self.log_path(file);
        let mut history = match self.entries(file) {
            Ok(h) => h,
            Err(e) => {
                let aside = self.set_aside(&final_path)?;
                log::warn!("{e:#}; kept as {} and starting a new history for {file}", aside.display());
                vec![]
            }
        };
        history.push(entry.clone());

        fs::create_dir_all(&self.log_dir)
            .with_context(|| format!("Failed to create {}", self.log_dir.display()))?;
        let tmp_path = final_path.with_extension("json.tmp");
        let json_text = serde_json::to_string_pretty(&history).context("Failed to serialize fix history")?;
        fs::write(&tmp_path, json_text).with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("Failed to rename fix history to {}", final_path.display()))?;
        Ok(entry)
    }

    /// Move an unreadable log to `<name>.json.corrupt-<timestamp>` so a new
    /// history never overwrites it.
    fn set_aside(&self, path: &Path) -> Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let mut aside = path.as_os_str().to_owned();
        aside.push(format!(".corrupt-{stamp}"));
        let aside = PathBuf::from(aside);
        fs::rename(path, &aside)
            .with_context(|| format!("Failed to move unreadable history {} aside", path.display()))?;
        Ok(aside)
    }

    /// How often each fix type (`metadata.fix_types`) occurs in `file`'s history.
    pub fn summarize_fix_types(&self, file: &str) -> Result<BTreeMap<String, usize>> {
        let mut summary = BTreeMap::new();
        for entry in self.entries(file)? {
            let Some(types) = entry.metadata.get("fix_types").and_then(Value::as_array) else {
                continue;
            };
            for t in types.iter().filter_map(Value::as_str) {
                *summary.entry(t.to_string()).or_insert(0) += 1;
            }
        }
        Ok(summary)
    }
}
