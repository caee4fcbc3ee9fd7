use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::OracleConfig;
use crate::context::RepairContext;
use crate::error::OracleError;

/// Which kind of rewrite the oracle is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// Fix broken or incomplete code so it compiles.
    Fix,
    /// Detect and fill in missing methods or logic from the legacy source.
    Complete,
}

impl RepairMode {
    pub fn agent_name(self) -> &'static str {
        match self {
            RepairMode::Fix => "fix",
            RepairMode::Complete => "completion",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
}

impl OracleRequest {
    /// Lay out the four context blobs as labeled sections.
    pub fn for_repair(ctx: &RepairContext, mode: RepairMode) -> Self {
        let (system, task) = match mode {
            RepairMode::Fix => (
                "You are a Java Spring Boot migration assistant.",
                "Fix the broken or incomplete code in the TARGET section so that it compiles.\n\
                 Only edit the TARGET file. Use LEGACY, ENTERPRISE and REFERENCE for guidance.",
            ),
            RepairMode::Complete => (
                "You are a Java Spring Boot code completion agent.",
                "Detect and complete any missing methods or logic in the TARGET section.\n\
                 Use LEGACY, ENTERPRISE and REFERENCE for guidance.",
            ),
        };

        let mut user = String::with_capacity(ctx.total_chars() + 512);
        user.push_str(task);
        user.push_str("\n\n");
        for (label, body) in [
            ("LEGACY", ctx.legacy_text.as_str()),
            ("ENTERPRISE", ctx.enterprise_text.as_str()),
            ("REFERENCE", ctx.reference_text.as_str()),
            ("TARGET", ctx.target_text.as_str()),
        ] {
            user.push_str("### ");
            user.push_str(label);
            user.push('\n');
            user.push_str(if body.trim().is_empty() { "(none)" } else { body });
            user.push_str("\n\n");
        }
        user.push_str("Respond with ONLY the complete updated source of the TARGET file.\n");

        Self {
            system: system.to_string(),
            user,
        }
    }
}

/// Prompt in, full replacement file text out.
pub trait TextOracle {
    fn generate(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// OpenAI-compatible chat completions client (blocking).
pub struct ChatOracle {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatOracle {
    pub fn new(cfg: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| OracleError::MissingKey(cfg.api_key_env.clone()))?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build();
        Ok(Self {
            agent,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }
}

impl TextOracle for ChatOracle {
    fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });
        let resp: Value = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)?
            .into_json()
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        parse_chat_response(&resp)
    }
}

fn parse_chat_response(resp: &Value) -> Result<String, OracleError> {
    resp.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| OracleError::Malformed("no choices[0].message.content".to_string()))
}

/// Used when no API key is configured: every call fails, so repairs are logged
/// as failed and the run still completes with the local heuristics.
pub struct UnavailableOracle {
    pub reason: String,
}

impl TextOracle for UnavailableOracle {
    fn generate(&self, _request: &OracleRequest) -> Result<String, OracleError> {
        Err(OracleError::Transport(self.reason.clone()))
    }
}
