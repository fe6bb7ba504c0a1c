//! Embedding providers.
//!
//! | `[embedding] provider` | Type | Backend |
//! |------------------------|------|---------|
//! | `disabled` | [`DisabledProvider`] | none, keyword-only retrieval |
//! | `openai` | [`OpenAIProvider`] | `POST {base}/embeddings`, any OpenAI-compatible gateway |
//! | `ollama` | [`OllamaProvider`] | `POST {base}/api/embed` |
//! | `local` | `LocalProvider` | fastembed, in-process (feature `local-embeddings-fastembed`) |
//!
//! # Retry strategy
//!
//! The HTTP providers share [`post_json_with_retry`]:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every provider rejects a response whose vectors are not `dims` long, so
//! a misconfigured `[embedding] dims` fails loudly instead of storing
//! vectors that can never match a query.

#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod ollama;
mod openai;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use hr_assistant_core::embedding::EmbeddingProvider;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

use crate::config::{EmbeddingConfig, ProviderKind};

/// An [`EmbeddingProvider`] that can actually compute vectors.
#[async_trait]
pub trait Embedder: EmbeddingProvider {
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text, e.g. a search query.
pub async fn embed_query(provider: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Used when `provider = "disabled"`; every embed call fails.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

#[async_trait]
impl Embedder for DisabledProvider {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

/// Build the provider named in `[embedding]`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    Ok(match config.provider {
        ProviderKind::Disabled => Arc::new(DisabledProvider),
        ProviderKind::OpenAI => Arc::new(OpenAIProvider::from_config(config)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_config(config)?),
        #[cfg(feature = "local-embeddings-fastembed")]
        ProviderKind::Local => Arc::new(LocalProvider::from_config(config)?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        ProviderKind::Local => {
            bail!("Local embedding provider requires --features local-embeddings-fastembed")
        }
    })
}

/// Retry knobs shared by the HTTP providers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Delay before retry number `attempt` (1-based).
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// POST a JSON body and return the JSON response, retrying transient failures.
///
/// `label` names the backend in error messages.
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    policy: RetryPolicy,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!(%label, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(%label, %status, "transient embedding error");
                    last_err = Some(anyhow!("{label} API error {status}: {body_text}"));
                    continue;
                }
                bail!("{label} API error {status}: {body_text}");
            }
            Err(e) => {
                tracing::warn!(%label, error = %e, "embedding request failed");
                last_err = Some(anyhow!("{label} connection error ({url}): {e}"));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{label} embedding failed after retries")))
}

/// Fail unless every vector has exactly `dims` components.
pub(crate) fn check_dims(
    vectors: Vec<Vec<f32>>,
    dims: usize,
    label: &str,
) -> Result<Vec<Vec<f32>>> {
    if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
        bail!(
            "{label} returned a {}-dimensional embedding, expected {dims} (check [embedding] dims)",
            v.len()
        );
    }
    Ok(vectors)
}

/// Parse a JSON array of numbers into a vector.
pub(crate) fn json_to_vec(value: &serde_json::Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("embedding contains a non-numeric value"))
        })
        .collect()
}
