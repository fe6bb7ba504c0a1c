//! `hrctl embed pending` / `hrctl embed rebuild`, plus the backfill that
//! runs at the end of every index pass.
//!
//! A chunk needs a vector when it has none for the current model, when the
//! stored vector has the wrong dimension, or when the stored hash no longer
//! matches the chunk's hash (heading or text changed since it was embedded).
//! See [`Store::pending_chunks`].

use anyhow::{bail, Result};

use hr_assistant_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, Embedder, EmbeddingProvider};
use crate::migrate;
use crate::models::Chunk;
use crate::sqlite_store::SqliteStore;

/// Counts from an embedding pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbedReport {
    pub candidates: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Embed chunks that are missing or have stale vectors.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<EmbedReport> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = SqliteStore::new(pool.clone());
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let pending = store
        .pending_chunks(provider.model_name(), provider.dims(), limit)
        .await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        pool.close().await;
        return Ok(EmbedReport {
            candidates: pending.len(),
            ..EmbedReport::default()
        });
    }

    let report = embed_chunks(provider.as_ref(), &store, &pending, batch_size).await;

    println!("embed pending");
    println!("  total pending: {}", report.candidates);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);

    pool.close().await;
    Ok(report)
}

/// Drop every stored vector and embed all chunks again.
pub async fn run_embed_rebuild(
    config: &Config,
    batch_size_override: Option<usize>,
) -> Result<EmbedReport> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = SqliteStore::new(pool.clone());
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    sqlx::query("DELETE FROM chunk_vectors")
        .execute(&pool)
        .await?;
    sqlx::query("DELETE FROM embeddings").execute(&pool).await?;
    tracing::info!("cleared existing embeddings");

    let all_chunks = store
        .pending_chunks(provider.model_name(), provider.dims(), None)
        .await?;
    let report = embed_chunks(provider.as_ref(), &store, &all_chunks, batch_size).await;

    println!("embed rebuild");
    println!("  total chunks: {}", report.candidates);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);

    pool.close().await;
    Ok(report)
}

/// Embed every chunk that lacks a current vector, as part of indexing.
///
/// Only listing the pending chunks can fail: a provider outage leaves the
/// chunks pending for the next load or `hrctl embed pending`, and keyword
/// search keeps working meanwhile.
pub async fn backfill_pending(
    provider: &dyn Embedder,
    store: &dyn Store,
    batch_size: usize,
) -> Result<EmbedReport> {
    let pending = store
        .pending_chunks(provider.model_name(), provider.dims(), None)
        .await?;
    if pending.is_empty() {
        return Ok(EmbedReport::default());
    }
    tracing::debug!(chunks = pending.len(), "embedding pending chunks");
    Ok(embed_chunks(provider, store, &pending, batch_size).await)
}

async fn embed_chunks(
    provider: &dyn Embedder,
    store: &dyn Store,
    chunks: &[Chunk],
    batch_size: usize,
) -> EmbedReport {
    let mut report = EmbedReport {
        candidates: chunks.len(),
        ..EmbedReport::default()
    };

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(Chunk::embedding_input).collect();

        let vectors = match provider.embed(&texts).await {
            Ok(v) if v.len() == batch.len() => v,
            Ok(v) => {
                tracing::warn!(
                    expected = batch.len(),
                    got = v.len(),
                    "embedding batch returned wrong number of vectors"
                );
                report.failed += batch.len();
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, size = batch.len(), "embedding batch failed");
                report.failed += batch.len();
                continue;
            }
        };

        for (chunk, vector) in batch.iter().zip(vectors.iter()) {
            match store
                .upsert_embedding(
                    &chunk.id,
                    &chunk.document_id,
                    vector,
                    provider.model_name(),
                    &chunk.hash,
                )
                .await
            {
                Ok(()) => report.embedded += 1,
                Err(e) => {
                    tracing::warn!(chunk_id = %chunk.id, error = %e, "failed to store embedding");
                    report.failed += 1;
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hr_assistant_core::embedding::EmbeddingProvider;
    use hr_assistant_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every other batch.
    struct FlakyEmbedder {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            2
        }
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                bail!("rate limited");
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn chunk(i: i64) -> Chunk {
        Chunk {
            id: format!("c{i}"),
            document_id: "d".into(),
            chunk_index: i,
            heading: Some("Vacaciones".into()),
            text: format!("texto {i}"),
            hash: format!("h{i}"),
        }
    }

    #[tokio::test]
    async fn test_failed_batches_are_counted_not_fatal() {
        let provider = FlakyEmbedder {
            calls: AtomicUsize::new(0),
        };
        let store = InMemoryStore::default();
        let chunks: Vec<Chunk> = (0..5).map(chunk).collect();

        let report = embed_chunks(&provider, &store, &chunks, 2).await;
        // batches: [0,1] ok, [2,3] fail, [4] ok
        assert_eq!(report.candidates, 5);
        assert_eq!(report.embedded, 3);
        assert_eq!(report.failed, 2);
    }

    #[tokio::test]
    async fn test_backfill_retries_what_failed_before() {
        let provider = FlakyEmbedder {
            calls: AtomicUsize::new(0),
        };
        let store = InMemoryStore::default();
        let chunks: Vec<Chunk> = (0..4).map(chunk).collect();
        store.replace_chunks("d", &chunks).await.unwrap();

        let first = backfill_pending(&provider, &store, 2).await.unwrap();
        assert_eq!((first.embedded, first.failed), (2, 2));

        // the failed batch is the only thing left; the next call succeeds
        let second = backfill_pending(&provider, &store, 2).await.unwrap();
        assert_eq!(second.candidates, 2);
        assert_eq!(second.embedded, 2);

        let done = backfill_pending(&provider, &store, 2).await.unwrap();
        assert_eq!(done, EmbedReport::default());
    }
}
