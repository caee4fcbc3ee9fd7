use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "migrafix.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenEstimatorConfig {
    pub chars_per_token: usize,
}

impl Default for TokenEstimatorConfig {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

/// How much of each legacy source file goes into the repair context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyMode {
    /// Whole file text.
    Full,
    /// Only the legacy method declarations the target file calls.
    CalledMethods,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Ceiling for the whole stitched context. Over this, the repair attempt is skipped.
    pub max_total_tokens: usize,
    /// Ceiling for nearest-neighbour reference text (also the per-file query filter).
    pub max_reference_tokens: usize,
    pub reference_top_k: usize,
    pub legacy_mode: LegacyMode,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_total_tokens: 9_500,
            max_reference_tokens: 3_000,
            reference_top_k: 3,
            legacy_mode: LegacyMode::Full,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Number of full file-level passes before giving up.
    pub max_retries: usize,
    /// Try the coarse build-file dependency fix before the per-file loop.
    pub dependency_fix: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            dependency_fix: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Program + args, run with the migrated root as working directory.
    pub command: Vec<String>,
    /// Substring whose presence in the combined output means the build passed.
    pub success_marker: String,
    /// Build file (relative to the migrated root) that receives inferred dependencies.
    pub build_file: String,
    /// Missing class name -> dependency line inserted into the build file.
    pub dependency_suggestions: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let command = if cfg!(windows) {
            vec!["gradlew.bat".to_string(), "build".to_string(), "--stacktrace".to_string()]
        } else {
            vec!["./gradlew".to_string(), "build".to_string(), "--stacktrace".to_string()]
        };
        Self {
            command,
            success_marker: "BUILD SUCCESSFUL".to_string(),
            build_file: "build.gradle".to_string(),
            dependency_suggestions: default_dependency_suggestions(),
        }
    }
}

fn default_dependency_suggestions() -> BTreeMap<String, String> {
    [
        ("RestController", "implementation 'org.springframework.boot:spring-boot-starter-web'"),
        ("RequestMapping", "implementation 'org.springframework.boot:spring-boot-starter-web'"),
        ("Autowired", "implementation 'org.springframework.boot:spring-boot-starter'"),
        ("JpaRepository", "implementation 'org.springframework.boot:spring-boot-starter-data-jpa'"),
        ("Entity", "implementation 'jakarta.persistence:jakarta.persistence-api:3.1.0'"),
        ("Slf4j", "implementation 'org.slf4j:slf4j-api:2.0.7'"),
        ("Log", "implementation 'org.apache.logging.log4j:log4j-api:2.20.0'"),
        ("HttpServletRequest", "implementation 'jakarta.servlet:jakarta.servlet-api:6.0.0'"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            max_tokens: 4_000,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Local static embeddings (Model2Vec via HuggingFace Hub).
    Model2vec,
    /// OpenAI-compatible `/embeddings` endpoint.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model2Vec repo id for `model2vec`, model name for `http`.
    pub model: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Where the `{path -> {hash, vector}}` cache lives.
    pub cache_path: PathBuf,
    /// File extensions (with the leading dot) that belong to the reference corpus.
    pub extensions: Vec<String>,
    /// Optional glob patterns (relative to the corpus root); empty means everything.
    pub include: Vec<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Model2vec,
            model: "minishlab/potion-retrieval-32M".to_string(),
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            cache_path: PathBuf::from(".migrafix/reference_embeddings.json"),
            extensions: [".java", ".gradle", ".xml", ".properties", ".yml", ".yaml", ".md"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            include: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub log_dir: PathBuf,
    /// Original/fixed text stored per entry is truncated to this many characters.
    pub cap_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(".migrafix/fix_history"),
            cap_chars: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    pub enabled: bool,
    /// Annotation placed above synthesized field declarations.
    pub injection_annotation: String,
    /// Import added alongside the annotation when missing; empty disables it.
    pub injection_import: String,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            injection_annotation: "@Autowired".to_string(),
            injection_import: "org.springframework.beans.factory.annotation.Autowired".to_string(),
        }
    }
}

/// Controls tree scanning (what to skip).
///
/// Note: `.gitignore` is always respected by the scanner; these are additional
/// hard skips for noisy directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory *names* to skip anywhere in the tree (e.g. "generated", "tmp").
    pub exclude_dir_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub token_estimator: TokenEstimatorConfig,
    pub context: ContextConfig,
    pub retry: RetryConfig,
    pub build: BuildConfig,
    pub oracle: OracleConfig,
    pub embeddings: EmbeddingConfig,
    pub history: HistoryConfig,
    pub heuristics: HeuristicsConfig,
    pub scan: ScanConfig,
}

fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".migrafix").join("config.json"))
}

/// Load configuration.
///
/// An explicit path must exist and parse. Without one, `./migrafix.json` and then
/// `~/.migrafix/config.json` are tried; absent files mean defaults.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<Config> {
    if let Some(path) = explicit {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        return serde_json::from_str::<Config>(&text)
            .with_context(|| format!("Invalid config {}", path.display()));
    }

    let candidates = std::iter::once(cwd.join(CONFIG_FILE_NAME)).chain(user_config_path());
    for path in candidates {
        let Ok(text) = std::fs::read_to_string(&path) else { continue };
        return serde_json::from_str::<Config>(&text)
            .with_context(|| format!("Invalid config {}", path.display()));
    }
    Ok(Config::default())
}

/// Rough token estimate (chars / chars_per_token, rounded up).
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    estimate_tokens_from_chars(text.chars().count(), chars_per_token)
}

pub fn estimate_tokens_from_chars(chars: usize, chars_per_token: usize) -> usize {
    if chars_per_token == 0 {
        return chars;
    }
    chars.div_ceil(chars_per_token)
}
