//! OpenAI-compatible `/embeddings` client.
//!
//! The base URL comes from `OPENAI_API_BASE`, then `[embedding] base_url`,
//! then `https://api.openai.com/v1`, so gateways such as OpenRouter or a
//! local LiteLLM proxy work unchanged.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use super::{
    check_dims, json_to_vec, post_json_with_retry, Embedder, EmbeddingProvider, RetryPolicy,
};
use crate::config::EmbeddingConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIProvider {
    model: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Build from config plus `OPENAI_API_KEY` / `OPENAI_API_BASE`.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;
        let base_url = std::env::var("OPENAI_API_BASE")
            .ok()
            .or_else(|| config.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;

        Self::new(model, dims, &base_url, api_key, RetryPolicy::from_config(config))
    }

    pub(crate) fn new(
        model: String,
        dims: usize,
        base_url: &str,
        api_key: String,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(policy.timeout).build()?;
        Ok(Self {
            model,
            dims,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            policy,
            client,
        })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

#[async_trait]
impl Embedder for OpenAIProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.policy,
            "OpenAI",
        )
        .await?;
        check_dims(parse_response(&json, texts.len())?, self.dims, "OpenAI")
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, json_to_vec(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);

    if indexed.len() != expected {
        return Err(anyhow!(
            "OpenAI returned {} embeddings for {} inputs",
            indexed.len(),
            expected
        ));
    }
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_parse_reorders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vecs = parse_response(&json, 2).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_rejects_count_mismatch() {
        let json = serde_json::json!({ "data": [{ "index": 0, "embedding": [1.0] }] });
        assert!(parse_response(&json, 2).is_err());
        assert!(parse_response(&serde_json::json!({}), 0).is_err());
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_retries_server_error_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/v1/embeddings",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(serde_json::json!({
                            "data": [{ "index": 0, "embedding": [0.25, 0.75] }]
                        })))
                    }
                }
            }),
        );
        let base = serve(router).await;
        let provider =
            OpenAIProvider::new("m".into(), 2, &base, "sk-test".into(), policy(2)).unwrap();

        let vecs = provider.embed(&["hola".to_string()]).await.unwrap();
        assert_eq!(vecs, vec![vec![0.25, 0.75]]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|| async {
                Json(serde_json::json!({
                    "data": [{ "index": 0, "embedding": [0.25, 0.75] }]
                }))
            }),
        );
        let base = serve(router).await;
        let provider =
            OpenAIProvider::new("m".into(), 1536, &base, "sk-test".into(), policy(0)).unwrap();

        let err = provider.embed(&["hola".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("expected 1536"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/v1/embeddings",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }
            }),
        );
        let base = serve(router).await;
        let provider =
            OpenAIProvider::new("m".into(), 2, &base, "bad".into(), policy(3)).unwrap();

        let err = provider.embed(&["hola".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
