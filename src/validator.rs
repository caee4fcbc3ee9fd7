use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// One compiler diagnostic, as reported (file path untouched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildError {
    pub file: String,
    pub line: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub success: bool,
    pub errors: Vec<BuildError>,
    pub raw_output: String,
}

/// Runs the external build and returns its combined textual output.
pub trait BuildRunner {
    fn run(&mut self) -> Result<String>;
}

/// Something that can say whether the target project currently builds.
pub trait Validate {
    fn validate(&mut self) -> ValidationResult;
}

/// Spawns `command[0] command[1..]` in the migrated root; stdout and stderr are concatenated.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: Vec<String>,
    cwd: PathBuf,
}

impl CommandRunner {
    pub fn new(command: Vec<String>, cwd: &Path) -> Result<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            bail!("Build command is empty");
        }
        Ok(Self {
            command,
            cwd: cwd.to_path_buf(),
        })
    }
}

impl BuildRunner for CommandRunner {
    fn run(&mut self) -> Result<String> {
        let output = Command::new(&self.command[0])
            .args(&self.command[1..])
            .current_dir(&self.cwd)
            .output()
            .with_context(|| format!("Failed to run build command {:?} in {}", self.command, self.cwd.display()))?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        log::debug!("build exited with {} ({} bytes of output)", output.status, text.len());
        Ok(text)
    }
}

fn diagnostic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:\[ERROR\]\s*)?((?:[A-Za-z]:)?[^:\n]+):(\d+):\s*error:\s*(.*?)\s*$").unwrap()
    })
}

/// Extract `<file>:<line>: error: <message>` diagnostics. Non-matching lines are ignored.
pub fn parse_build_output(output: &str) -> Vec<BuildError> {
    diagnostic_re()
        .captures_iter(output)
        .filter_map(|cap| {
            Some(BuildError {
                file: cap[1].trim().to_string(),
                line: cap[2].parse().ok()?,
                message: cap[3].to_string(),
            })
        })
        .collect()
}

pub struct BuildValidator<R: BuildRunner> {
    runner: R,
    success_marker: String,
}

impl<R: BuildRunner> BuildValidator<R> {
    pub fn new(runner: R, success_marker: &str) -> Self {
        Self {
            runner,
            success_marker: success_marker.to_string(),
        }
    }

    /// Classify a finished build's output.
    pub fn classify(&self, raw_output: String) -> ValidationResult {
        if raw_output.contains(&self.success_marker) {
            return ValidationResult {
                success: true,
                errors: vec![],
                raw_output,
            };
        }
        ValidationResult {
            success: false,
            errors: parse_build_output(&raw_output),
            raw_output,
        }
    }
}

impl<R: BuildRunner> Validate for BuildValidator<R> {
    fn validate(&mut self) -> ValidationResult {
        match self.runner.run() {
            Ok(output) => self.classify(output),
            Err(e) => {
                log::error!("{e:#}");
                ValidationResult {
                    success: false,
                    errors: vec![],
                    raw_output: format!("{e:#}"),
                }
            }
        }
    }
}
