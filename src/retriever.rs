//! The policy retriever: the one query interface the agent loop calls.
//!
//! [`PolicyRetriever`] owns a store and an embedding provider and turns a
//! free-text question into ranked manual passages. Semantic and hybrid
//! queries degrade to keyword search when no embedding provider is
//! configured or the query cannot be embedded, so a missing API key never
//! takes the assistant offline.

use anyhow::{bail, Result};
use std::sync::Arc;

use hr_assistant_core::embedding::QueryEmbedding;
use hr_assistant_core::search::{search, SearchMode, SearchRequest, SearchResultItem};
use hr_assistant_core::store::{DocumentResponse, Store};

use crate::config::{Config, EmbeddingConfig, RetrievalConfig};
use crate::db;
use crate::embedding::{self, embed_query, DisabledProvider, Embedder, EmbeddingProvider};
use crate::ingest;
use crate::sqlite_store::SqliteStore;

/// Shown to the model when nothing in the manual matched.
pub const NO_PASSAGES: &str = "No se encontraron pasajes relevantes en el manual del empleado.";

#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Defaults to `[retrieval] default_mode`.
    pub mode: Option<SearchMode>,
    /// Defaults to `[retrieval] final_limit`.
    pub limit: Option<i64>,
    pub explain: bool,
}

#[derive(Clone)]
pub struct PolicyRetriever {
    store: Arc<dyn Store>,
    provider: Arc<dyn Embedder>,
    embeddings_enabled: bool,
    retrieval: RetrievalConfig,
}

impl PolicyRetriever {
    /// Bring the index up to date with the manual, then open it.
    pub async fn open(config: &Config) -> Result<Self> {
        ingest::ensure_index(config).await?;
        let pool = db::connect(config).await?;
        let (provider, embeddings_enabled) = query_provider(&config.embedding);

        Ok(Self {
            store: Arc::new(SqliteStore::new(pool)),
            provider,
            embeddings_enabled,
            retrieval: config.retrieval.clone(),
        })
    }

    /// Assemble a retriever from parts, e.g. an in-memory store in tests.
    pub fn with_parts(
        store: Arc<dyn Store>,
        provider: Arc<dyn Embedder>,
        embeddings_enabled: bool,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            provider,
            embeddings_enabled,
            retrieval,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Rank manual passages for `query`.
    pub async fn retrieve(
        &self,
        query: &str,
        opts: &RetrieveOptions,
    ) -> Result<Vec<SearchResultItem>> {
        if let Some(limit) = opts.limit {
            if limit < 1 {
                bail!("limit must be at least 1");
            }
        }

        let requested = opts.mode.unwrap_or(self.retrieval.default_mode);
        let mut mode = requested;
        let mut query_vec = None;

        if requested.needs_embeddings() {
            if !self.embeddings_enabled {
                tracing::debug!(%requested, "embeddings disabled, using keyword search");
                mode = SearchMode::Keyword;
            } else if !query.trim().is_empty() {
                match embed_query(self.provider.as_ref(), query).await {
                    Ok(v) => query_vec = Some(v),
                    Err(e) => {
                        tracing::warn!(error = %e, "query embedding failed, using keyword search");
                        mode = SearchMode::Keyword;
                    }
                }
            }
        }

        let req = SearchRequest {
            query,
            query_vec: query_vec.as_deref().map(|vector| QueryEmbedding {
                model: self.provider.model_name(),
                vector,
            }),
            mode,
            params: self.retrieval.params(opts.limit),
            explain: opts.explain,
        };
        let results = search(self.store.as_ref(), &req).await?;
        tracing::debug!(%mode, results = results.len(), "retrieved passages");
        Ok(results)
    }

    pub async fn document(&self, id: &str) -> Result<Option<DocumentResponse>> {
        self.store.get_document(id).await
    }
}

/// The provider used to embed queries, and whether semantic search is on.
///
/// A provider that cannot be built (missing API key, unknown local model)
/// turns semantic search off instead of failing, so the record tools and
/// keyword search stay available.
fn query_provider(config: &EmbeddingConfig) -> (Arc<dyn Embedder>, bool) {
    if !config.is_enabled() {
        return (Arc::new(DisabledProvider), false);
    }
    match embedding::create_provider(config) {
        Ok(provider) => (provider, true),
        Err(e) => {
            tracing::warn!(
                provider = %config.provider,
                error = %e,
                "embedding provider unavailable, using keyword search"
            );
            (Arc::new(DisabledProvider), false)
        }
    }
}

/// Join passages into the context block handed to the language model.
///
/// Each passage is prefixed with its heading path when it has one;
/// passages are separated by blank lines.
pub fn render_context(results: &[SearchResultItem]) -> String {
    if results.is_empty() {
        return NO_PASSAGES.to_string();
    }

    results
        .iter()
        .map(|r| match &r.heading {
            Some(h) => format!("## {h}\n{}", r.text),
            None => r.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
