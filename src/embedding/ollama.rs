//! Ollama `/api/embed` client.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{
    check_dims, json_to_vec, post_json_with_retry, Embedder, EmbeddingProvider, RetryPolicy,
};
use crate::config::EmbeddingConfig;

const DEFAULT_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    model: String,
    dims: usize,
    endpoint: String,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_URL);
        let policy = RetryPolicy::from_config(config);

        Ok(Self {
            model,
            dims,
            endpoint: format!("{}/api/embed", base.trim_end_matches('/')),
            policy,
            client: reqwest::Client::builder().timeout(policy.timeout).build()?,
        })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

#[async_trait]
impl Embedder for OllamaProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            None,
            &body,
            self.policy,
            "Ollama",
        )
        .await?;
        check_dims(parse_response(&json)?, self.dims, "Ollama")
    }
}

fn parse_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(json_to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embeddings_array() {
        let json = serde_json::json!({ "embeddings": [[0.1, 0.2], [0.3, 0.4]] });
        let vecs = parse_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert!((vecs[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_default_endpoint() {
        let config = EmbeddingConfig {
            provider: crate::config::ProviderKind::Ollama,
            model: Some("nomic-embed-text".into()),
            dims: Some(768),
            ..EmbeddingConfig::default()
        };
        let provider = OllamaProvider::from_config(&config).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:11434/api/embed");
    }
}
