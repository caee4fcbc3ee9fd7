use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{EmbeddingBackend, EmbeddingConfig};

/// Text in, fixed-length vector out.
///
/// Implementations block; the similarity index calls them sequentially.
pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Local static embeddings (Model2Vec). The model is downloaded from the
/// HuggingFace Hub on first use and cached by the hub client.
#[cfg(feature = "local-embeddings")]
pub struct StaticModelEmbedder {
    model: model2vec_rs::model::StaticModel,
}

#[cfg(feature = "local-embeddings")]
impl StaticModelEmbedder {
    pub fn load(model_id: &str) -> Result<Self> {
        let model = model2vec_rs::model::StaticModel::from_pretrained(model_id, None, None, None)
            .with_context(|| format!("Failed to load embedding model {model_id}"))?;
        Ok(Self { model })
    }
}

#[cfg(feature = "local-embeddings")]
impl Embedder for StaticModelEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.model.encode_single(text))
    }
}

/// OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| anyhow!("Embedding API key not set (expected env var {})", cfg.api_key_env))?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build();
        Ok(Self {
            agent,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp: Value = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(json!({ "model": self.model, "input": [text] }))
            .map_err(|e| anyhow!("Embedding request failed: {e}"))?
            .into_json()
            .context("Embedding response is not JSON")?;
        parse_embedding_response(&resp)
    }
}

fn parse_embedding_response(resp: &Value) -> Result<Vec<f32>> {
    let arr = resp
        .pointer("/data/0/embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Embedding response has no data[0].embedding"))?;
    arr.iter()
        .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| anyhow!("Non-numeric embedding component")))
        .collect()
}

/// Build the embedder selected by config.
pub fn from_config(cfg: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match cfg.backend {
        EmbeddingBackend::Http => Ok(Box::new(HttpEmbedder::new(cfg)?)),
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Model2vec => Ok(Box::new(StaticModelEmbedder::load(&cfg.model)?)),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::Model2vec => Err(anyhow!(
            "model2vec backend requires the `local-embeddings` feature; set embeddings.backend = \"http\""
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_style_payload() {
        let resp = json!({"data": [{"embedding": [0.5, -1.0, 2]}], "model": "x"});
        assert_eq!(parse_embedding_response(&resp).unwrap(), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn rejects_payload_without_vector() {
        assert!(parse_embedding_response(&json!({"data": []})).is_err());
        assert!(parse_embedding_response(&json!({"data": [{"embedding": ["a"]}]})).is_err());
    }
}
