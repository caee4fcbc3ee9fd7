use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::deps::{DependencyFixOutcome, DependencyFixer};
use crate::error::RepairError;
use crate::history::FixStatus;
use crate::mapping::MappingIndex;
use crate::oracle::RepairMode;
use crate::repair::Repair;
use crate::scanner::rel_slash_path;
use crate::validator::{BuildError, Validate};

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    SuccessAfterDependencyFix,
    SuccessAfterRetry,
    FailedAfterRetries,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::SuccessAfterDependencyFix => "success_after_dependency_fix",
            RunStatus::SuccessAfterRetry => "success_after_retry",
            RunStatus::FailedAfterRetries => "failed_after_retries",
        }
    }

    pub fn is_success(self) -> bool {
        !matches!(self, RunStatus::FailedAfterRetries)
    }

    pub fn exit_code(self) -> i32 {
        if self.is_success() {
            0
        } else {
            2
        }
    }
}

/// One repair invocation made by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttempt {
    pub pass: usize,
    pub file: String,
    pub mode: Option<RepairMode>,
    pub status: FixStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    /// File-level passes executed.
    pub retry_attempts: usize,
    /// Structured errors of the last validation (empty on success).
    pub errors: Vec<BuildError>,
    pub dependency_fixes: Vec<String>,
    pub attempts: Vec<FileAttempt>,
    pub not_found: Vec<String>,
    pub unmapped: Vec<String>,
}

/// Transient per-run bookkeeping.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempt: usize,
    pub outstanding: BTreeSet<String>,
    not_found: BTreeSet<String>,
    unmapped: BTreeSet<String>,
}

/// Normalize a diagnostic's file to the `/`-separated path relative to the migrated root.
pub fn canonical_target(file: &str, migrated_root: &Path) -> String {
    let path = Path::new(file);
    if path.is_absolute() {
        if let Some(rel) = rel_slash_path(path, migrated_root) {
            return rel;
        }
        if let Ok(root) = migrated_root.canonicalize() {
            if let Some(rel) = rel_slash_path(path, &root) {
                return rel;
            }
        }
    }
    let slashed = file.replace('\\', "/");
    slashed.strip_prefix("./").unwrap_or(&slashed).to_string()
}

/// Validate, fix dependencies once, then run bounded per-file repair passes.
pub struct RetryController<'a> {
    validator: &'a mut dyn Validate,
    repairer: &'a mut dyn Repair,
    mapping: &'a MappingIndex,
    deps: Option<&'a DependencyFixer>,
    migrated_root: PathBuf,
    max_retries: usize,
    progress: Option<Box<dyn FnMut(&str) + 'a>>,
}

impl<'a> RetryController<'a> {
    pub fn new(
        validator: &'a mut dyn Validate,
        repairer: &'a mut dyn Repair,
        mapping: &'a MappingIndex,
        migrated_root: &Path,
        max_retries: usize,
    ) -> Self {
        Self {
            validator,
            repairer,
            mapping,
            deps: None,
            migrated_root: migrated_root.to_path_buf(),
            max_retries,
            progress: None,
        }
    }

    pub fn with_dependency_fixer(mut self, deps: Option<&'a DependencyFixer>) -> Self {
        self.deps = deps;
        self
    }

    /// Called with a short status line whenever the loop changes phase.
    pub fn with_progress(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    fn report_progress(&mut self, msg: &str) {
        if let Some(f) = self.progress.as_mut() {
            f(msg);
        }
    }

    fn finish(status: RunStatus, state: RetryState, errors: Vec<BuildError>, dependency_fixes: Vec<String>, attempts: Vec<FileAttempt>) -> RunReport {
        RunReport {
            status,
            retry_attempts: state.attempt,
            errors,
            dependency_fixes,
            attempts,
            not_found: state.not_found.into_iter().collect(),
            unmapped: state.unmapped.into_iter().collect(),
        }
    }

    /// Files from `errors` that are worth a repair pass. Unmapped and missing
    /// files are recorded once and dropped for the rest of the run.
    fn work_set(&self, errors: &[BuildError], state: &mut RetryState, attempts: &mut Vec<FileAttempt>) -> BTreeSet<String> {
        let mut work = BTreeSet::new();
        let candidates: BTreeSet<String> = errors
            .iter()
            .map(|e| canonical_target(&e.file, &self.migrated_root))
            .collect();
        for file in candidates {
            if state.not_found.contains(&file) || state.unmapped.contains(&file) {
                continue;
            }
            if !self.migrated_root.join(&file).is_file() {
                log::warn!("{file}: reported by the build but not found under the migrated root");
                attempts.push(FileAttempt {
                    pass: state.attempt + 1,
                    file: file.clone(),
                    mode: None,
                    status: FixStatus::Failed,
                    reason: Some(RepairError::TargetNotFound.to_string()),
                });
                state.not_found.insert(file);
                continue;
            }
            if self.mapping.sources_for(&file).is_empty() {
                log::warn!("{file}: no source mapping, skipping");
                attempts.push(FileAttempt {
                    pass: state.attempt + 1,
                    file: file.clone(),
                    mode: None,
                    status: FixStatus::Skipped,
                    reason: Some(RepairError::Unmapped(file.clone()).to_string()),
                });
                state.unmapped.insert(file);
                continue;
            }
            work.insert(file);
        }
        work
    }

    pub fn run(mut self) -> RunReport {
        let mut state = RetryState::default();
        let mut attempts = Vec::new();
        let mut dependency_fixes = Vec::new();
        let not_found_reason = RepairError::TargetNotFound.to_string();

        self.report_progress("validating build");
        let mut latest = self.validator.validate();
        if latest.success {
            log::info!("build passes, nothing to repair");
            return Self::finish(RunStatus::Success, state, vec![], dependency_fixes, attempts);
        }
        log::info!("build failed with {} structured errors", latest.errors.len());

        if let Some(deps) = self.deps {
            self.report_progress("fixing build dependencies");
            match deps.fix(&latest.raw_output) {
                Ok(DependencyFixOutcome::Fixed(lines)) => {
                    dependency_fixes = lines;
                    self.report_progress("re-validating after dependency fix");
                    latest = self.validator.validate();
                    if latest.success {
                        log::info!("build passes after dependency fix");
                        return Self::finish(RunStatus::SuccessAfterDependencyFix, state, vec![], dependency_fixes, attempts);
                    }
                }
                Ok(DependencyFixOutcome::Skipped(reason)) => log::info!("dependency fix skipped: {reason}"),
                Err(e) => log::warn!("dependency fix failed: {e:#}"),
            }
        }

        while state.attempt < self.max_retries {
            let work = self.work_set(&latest.errors, &mut state, &mut attempts);
            state.outstanding = work;
            if state.outstanding.is_empty() {
                log::warn!("no repairable files left");
                break;
            }
            state.attempt += 1;
            log::info!(
                "pass {}/{}: repairing {} files",
                state.attempt,
                self.max_retries,
                state.outstanding.len()
            );

            let files: Vec<String> = state.outstanding.iter().cloned().collect();
            for file in files {
                let sources = self.mapping.sources_for(&file).to_vec();
                for mode in [RepairMode::Fix, RepairMode::Complete] {
                    self.report_progress(&format!("pass {}: {} ({})", state.attempt, file, mode.agent_name()));
                    let outcome = self.repairer.repair(&file, &sources, mode);
                    let success = outcome.is_success();
                    let missing = outcome.reason.as_deref() == Some(not_found_reason.as_str());
                    attempts.push(FileAttempt {
                        pass: state.attempt,
                        file: file.clone(),
                        mode: Some(mode),
                        status: outcome.status,
                        reason: outcome.reason,
                    });
                    if missing {
                        state.not_found.insert(file.clone());
                    }
                    if success || missing {
                        break;
                    }
                }
            }

            self.report_progress(&format!("pass {}: validating build", state.attempt));
            latest = self.validator.validate();
            if latest.success {
                log::info!("build passes after {} repair passes", state.attempt);
                return Self::finish(RunStatus::SuccessAfterRetry, state, vec![], dependency_fixes, attempts);
            }
        }

        log::warn!(
            "giving up after {} passes with {} errors remaining",
            state.attempt,
            latest.errors.len()
        );
        Self::finish(RunStatus::FailedAfterRetries, state, latest.errors, dependency_fixes, attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingEntry;
    use crate::repair::RepairOutcome;
    use crate::validator::ValidationResult;
    use std::fs;
    use tempfile::TempDir;

    struct ScriptedValidator {
        results: Vec<ValidationResult>,
        calls: usize,
    }

    impl ScriptedValidator {
        fn new(results: Vec<ValidationResult>) -> Self {
            Self { results, calls: 0 }
        }
    }

    impl Validate for ScriptedValidator {
        fn validate(&mut self) -> ValidationResult {
            self.calls += 1;
            if self.results.len() > 1 {
                self.results.remove(0)
            } else {
                self.results[0].clone()
            }
        }
    }

    #[derive(Default)]
    struct ScriptedRepair {
        calls: Vec<(String, RepairMode)>,
        fix_succeeds: bool,
        /// Every call reports an oversized context.
        too_large: bool,
    }

    impl Repair for ScriptedRepair {
        fn repair(&mut self, target: &str, _sources: &[String], mode: RepairMode) -> RepairOutcome {
            self.calls.push((target.to_string(), mode));
            if self.too_large {
                return RepairOutcome {
                    status: FixStatus::Skipped,
                    updated_text: None,
                    applied_fixes: vec![],
                    reason: Some(RepairError::ContextTooLarge { tokens: 12_000, limit: 9_500 }.to_string()),
                };
            }
            let ok = mode == RepairMode::Complete || self.fix_succeeds;
            RepairOutcome {
                status: if ok { FixStatus::Success } else { FixStatus::Failed },
                updated_text: None,
                applied_fixes: vec![],
                reason: (!ok).then(|| "oracle down".to_string()),
            }
        }
    }

    fn failing(files: &[&str]) -> ValidationResult {
        ValidationResult {
            success: false,
            errors: files
                .iter()
                .map(|f| BuildError {
                    file: f.to_string(),
                    line: 10,
                    message: "cannot find symbol".into(),
                })
                .collect(),
            raw_output: "BUILD FAILED".into(),
        }
    }

    fn passing() -> ValidationResult {
        ValidationResult {
            success: true,
            errors: vec![],
            raw_output: "BUILD SUCCESSFUL".into(),
        }
    }

    fn mapping() -> MappingIndex {
        MappingIndex::load(vec![MappingEntry {
            source_paths: vec!["A.java".into()],
            target_paths: vec!["B.java".into(), "C.java".into()],
            source_kind: "Service".into(),
            target_kind: "Service".into(),
        }])
    }

    fn migrated(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for f in files {
            fs::write(tmp.path().join(f), "class X {}").unwrap();
        }
        tmp
    }

    #[test]
    fn first_validation_success_needs_no_repair() {
        let tmp = migrated(&["B.java"]);
        let map = mapping();
        let mut v = ScriptedValidator::new(vec![passing()]);
        let mut r = ScriptedRepair::default();
        let report = RetryController::new(&mut v, &mut r, &map, tmp.path(), 2).run();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.retry_attempts, 0);
        assert!(r.calls.is_empty());
        assert_eq!(v.calls, 1);
    }

    #[test]
    fn errors_are_deduplicated_and_escalated_per_file() {
        let tmp = migrated(&["B.java"]);
        let map = mapping();
        let abs = tmp.path().join("B.java").to_string_lossy().into_owned();
        let mut v = ScriptedValidator::new(vec![failing(&["B.java", &abs, "./B.java"]), passing()]);
        let mut r = ScriptedRepair::default();

        let report = RetryController::new(&mut v, &mut r, &map, tmp.path(), 2).run();
        assert_eq!(report.status, RunStatus::SuccessAfterRetry);
        assert_eq!(report.retry_attempts, 1);
        assert_eq!(
            r.calls,
            vec![("B.java".to_string(), RepairMode::Fix), ("B.java".to_string(), RepairMode::Complete)]
        );
        assert_eq!(v.calls, 2, "one validation per pass");
    }

    #[test]
    fn exhaustion_reports_remaining_errors() {
        let tmp = migrated(&["B.java"]);
        let map = mapping();
        let mut v = ScriptedValidator::new(vec![failing(&["B.java"])]);
        let mut r = ScriptedRepair {
            fix_succeeds: true,
            ..Default::default()
        };

        let report = RetryController::new(&mut v, &mut r, &map, tmp.path(), 3).run();
        assert_eq!(report.status, RunStatus::FailedAfterRetries);
        assert_eq!(report.status.exit_code(), 2);
        assert_eq!(report.retry_attempts, 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(r.calls.len(), 3, "successful fix needs no completion");
        assert_eq!(v.calls, 4);
    }

    #[test]
    fn skipped_files_are_retried_in_the_next_pass() {
        let tmp = migrated(&["B.java"]);
        let map = mapping();
        let mut v = ScriptedValidator::new(vec![failing(&["B.java"])]);
        let mut r = ScriptedRepair {
            too_large: true,
            ..Default::default()
        };

        let report = RetryController::new(&mut v, &mut r, &map, tmp.path(), 2).run();
        assert_eq!(report.status, RunStatus::FailedAfterRetries);
        assert_eq!(report.retry_attempts, 2);
        let b = |mode| ("B.java".to_string(), mode);
        assert_eq!(
            r.calls,
            vec![b(RepairMode::Fix), b(RepairMode::Complete), b(RepairMode::Fix), b(RepairMode::Complete)]
        );
        let passes: Vec<usize> = report.attempts.iter().map(|a| a.pass).collect();
        assert_eq!(passes, vec![1, 1, 2, 2]);
        assert!(report.attempts.iter().all(|a| a.status == FixStatus::Skipped));
        assert!(report.not_found.is_empty() && report.unmapped.is_empty());
        assert_eq!(v.calls, 3);
    }

    #[test]
    fn unmapped_and_missing_files_are_never_retried() {
        let tmp = migrated(&["Orphan.java"]);
        let map = mapping();
        let mut v = ScriptedValidator::new(vec![failing(&["Orphan.java", "C.java"])]);
        let mut r = ScriptedRepair::default();

        let report = RetryController::new(&mut v, &mut r, &map, tmp.path(), 2).run();
        assert_eq!(report.status, RunStatus::FailedAfterRetries);
        assert_eq!(report.retry_attempts, 0, "nothing repairable, no budget spent");
        assert!(r.calls.is_empty());
        assert_eq!(report.unmapped, vec!["Orphan.java"]);
        assert_eq!(report.not_found, vec!["C.java"]);
        assert_eq!(v.calls, 1);
        assert_eq!(report.attempts.len(), 2);
    }

    #[test]
    fn dependency_fix_can_end_the_run() {
        let tmp = migrated(&["B.java"]);
        fs::write(tmp.path().join("build.gradle"), "dependencies {\n}\n").unwrap();
        let mut suggestions = std::collections::BTreeMap::new();
        suggestions.insert("Slf4j".to_string(), "implementation 'org.slf4j:slf4j-api:2.0.7'".to_string());
        let deps = DependencyFixer::new(tmp.path(), "build.gradle", suggestions);
        let map = mapping();

        let mut first = failing(&["B.java"]);
        first.raw_output = "B.java:1: error: cannot find symbol\n  symbol:   class Slf4j\n".into();
        let mut v = ScriptedValidator::new(vec![first, passing()]);
        let mut r = ScriptedRepair::default();

        let mut phases = Vec::new();
        let report = RetryController::new(&mut v, &mut r, &map, tmp.path(), 2)
            .with_dependency_fixer(Some(&deps))
            .with_progress(|m| phases.push(m.to_string()))
            .run();
        assert_eq!(report.status, RunStatus::SuccessAfterDependencyFix);
        assert_eq!(report.retry_attempts, 0);
        assert_eq!(report.dependency_fixes, vec!["implementation 'org.slf4j:slf4j-api:2.0.7'"]);
        assert!(r.calls.is_empty());
        assert!(phases.iter().any(|p| p.contains("dependency")));
    }

    #[test]
    fn canonical_targets_are_root_relative() {
        let root = Path::new("/work/migrated");
        assert_eq!(canonical_target("/work/migrated/src/B.java", root), "src/B.java");
        assert_eq!(canonical_target("src\\B.java", root), "src/B.java");
        assert_eq!(canonical_target("./B.java", root), "B.java");
    }

    #[test]
    fn status_names_and_exit_codes() {
        assert_eq!(serde_json::to_string(&RunStatus::SuccessAfterRetry).unwrap(), "\"success_after_retry\"");
        assert_eq!(RunStatus::SuccessAfterDependencyFix.exit_code(), 0);
        assert_eq!(RunStatus::FailedAfterRetries.as_str(), "failed_after_retries");
    }
}
