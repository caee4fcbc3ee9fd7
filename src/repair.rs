use serde_json::{json, Map, Value};
use std::fs;

use crate::config::HeuristicsConfig;
use crate::context::{ContextAssembler, EnterpriseCatalog};
use crate::error::RepairError;
use crate::heuristics::{apply_local_fixes, AppliedFix, TypeCatalog, TypeSource};
use crate::history::{FixHistory, FixStatus};
use crate::oracle::{OracleRequest, RepairMode, TextOracle};
use crate::sanitize::sanitize_generated;

/// Result of one repair invocation on one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub status: FixStatus,
    /// Text now on disk, when this invocation changed the file.
    pub updated_text: Option<String>,
    pub applied_fixes: Vec<AppliedFix>,
    pub reason: Option<String>,
}

impl RepairOutcome {
    pub fn is_success(&self) -> bool {
        self.status == FixStatus::Success
    }
}

pub trait Repair {
    /// Repair `target` (relative to the migrated root) using the legacy `sources` it came from.
    fn repair(&mut self, target: &str, sources: &[String], mode: RepairMode) -> RepairOutcome;
}

/// Local heuristics first, then a full-file rewrite by the oracle.
pub struct FileRepairer {
    assembler: ContextAssembler,
    oracle: Box<dyn TextOracle>,
    types: Box<dyn TypeSource>,
    enterprise: Option<EnterpriseCatalog>,
    history: FixHistory,
    heuristics: HeuristicsConfig,
}

impl FileRepairer {
    pub fn new(assembler: ContextAssembler, oracle: Box<dyn TextOracle>, history: FixHistory) -> Self {
        Self {
            assembler,
            oracle,
            types: Box::new(TypeCatalog::default()),
            enterprise: None,
            history,
            heuristics: HeuristicsConfig::default(),
        }
    }

    pub fn with_types(mut self, types: Box<dyn TypeSource>) -> Self {
        self.types = types;
        self
    }

    pub fn with_enterprise(mut self, catalog: Option<EnterpriseCatalog>) -> Self {
        self.enterprise = catalog;
        self
    }

    pub fn with_heuristics(mut self, cfg: HeuristicsConfig) -> Self {
        self.heuristics = cfg;
        self
    }

    pub fn history(&self) -> &FixHistory {
        &self.history
    }

    fn write_target(&self, target: &str, text: &str) -> Result<(), RepairError> {
        fs::write(self.assembler.migrated_root().join(target), text)?;
        Ok(())
    }

    /// Everything after the local heuristics. Returns the text written on success.
    fn rewrite_with_oracle(&self, target: &str, sources: &[String], current: &str, mode: RepairMode) -> Result<String, RepairError> {
        let refs = self
            .enterprise
            .as_ref()
            .map(|catalog| catalog.refs_for(current))
            .unwrap_or_default();
        let ctx = self.assembler.build(target, sources, &refs)?;
        let request = OracleRequest::for_repair(&ctx, mode);
        let raw = self.oracle.generate(&request)?;
        let cleaned = sanitize_generated(&raw);
        if cleaned.trim().is_empty() {
            return Err(RepairError::EmptyResponse);
        }
        self.write_target(target, &cleaned)?;
        Ok(cleaned)
    }

    fn log(&self, target: &str, sources: &[String], mode: RepairMode, original: &str, outcome: &RepairOutcome) {
        let mut metadata = Map::new();
        let fix_types: Vec<&str> = outcome.applied_fixes.iter().map(AppliedFix::fix_type).collect();
        metadata.insert("fix_types".into(), json!(fix_types));
        if !outcome.applied_fixes.is_empty() {
            metadata.insert(
                "applied_fixes".into(),
                serde_json::to_value(&outcome.applied_fixes).unwrap_or(Value::Null),
            );
        }
        metadata.insert("sources".into(), json!(sources));
        if let Some(reason) = &outcome.reason {
            metadata.insert("reason".into(), json!(reason));
        }
        if let Err(e) = self.history.record(
            target,
            mode.agent_name(),
            outcome.status,
            original,
            outcome.updated_text.as_deref(),
            metadata,
        ) {
            log::warn!("could not record fix history for {target}: {e:#}");
        }
    }
}

impl Repair for FileRepairer {
    fn repair(&mut self, target: &str, sources: &[String], mode: RepairMode) -> RepairOutcome {
        let path = self.assembler.migrated_root().join(target);
        let original = match fs::read(&path) {
            Ok(bytes) if path.is_file() => String::from_utf8_lossy(&bytes).into_owned(),
            _ => {
                let outcome = RepairOutcome {
                    status: FixStatus::Failed,
                    updated_text: None,
                    applied_fixes: vec![],
                    reason: Some(RepairError::TargetNotFound.to_string()),
                };
                log::warn!("{target}: target file not found");
                self.log(target, sources, mode, "", &outcome);
                return outcome;
            }
        };

        let mut current = original.clone();
        let mut applied = Vec::new();
        let mut updated_text = None;
        if mode == RepairMode::Fix && self.heuristics.enabled {
            let local = apply_local_fixes(&original, self.types.as_ref(), &self.heuristics);
            if local.changed() {
                if let Err(e) = self.write_target(target, &local.text) {
                    let outcome = RepairOutcome {
                        status: FixStatus::Failed,
                        updated_text: None,
                        applied_fixes: vec![],
                        reason: Some(e.to_string()),
                    };
                    self.log(target, sources, mode, &original, &outcome);
                    return outcome;
                }
                for fix in &local.fixes {
                    log::debug!("{target}: local fix {}", fix.fix_type());
                }
                current = local.text;
                applied = local.fixes;
                updated_text = Some(current.clone());
            }
        }

        let outcome = match self.rewrite_with_oracle(target, sources, &current, mode) {
            Ok(written) => RepairOutcome {
                status: FixStatus::Success,
                updated_text: Some(written),
                applied_fixes: applied,
                reason: None,
            },
            Err(e @ RepairError::ContextTooLarge { .. }) => {
                log::warn!("{target}: {e}; skipping this attempt");
                RepairOutcome {
                    status: FixStatus::Skipped,
                    updated_text,
                    applied_fixes: applied,
                    reason: Some(e.to_string()),
                }
            }
            Err(e) => {
                log::warn!("{target}: {} repair failed: {e}", mode.agent_name());
                RepairOutcome {
                    status: FixStatus::Failed,
                    updated_text,
                    applied_fixes: applied,
                    reason: Some(e.to_string()),
                }
            }
        };
        self.log(target, sources, mode, &original, &outcome);
        outcome
    }
}
