//! Index build: manual scan → chunking → storage → embedding backfill.
//!
//! Indexing is content-addressed. A document whose dedup hash matches the
//! stored one keeps its chunks and vectors; anything else is re-chunked.
//! Files that vanished from the manual are removed from the index. This is
//! what makes [`ensure_index`] cheap enough to run on every start.
//!
//! Embedding is a separate pass over every chunk without a current vector,
//! so chunks left pending by an earlier provider outage, or embedded by a
//! model that has since been replaced, are picked up on the next load.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;

use hr_assistant_core::chunk::{chunk_markdown, chunk_text, ChunkOptions};
use hr_assistant_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embed_cmd;
use crate::embedding::{self, Embedder};
use crate::manual::{self, ManualScan};
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexOptions {
    /// Re-chunk every document even when its hash is unchanged.
    pub full: bool,
    /// Report what would change without writing.
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct IndexReport {
    pub scanned: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub chunks: usize,
    pub embeddings_written: usize,
    pub embeddings_pending: usize,
}

impl IndexReport {
    pub fn changed(&self) -> bool {
        self.indexed > 0 || self.removed > 0
    }
}

/// Index the configured manual into the SQLite store.
pub async fn index_manual(config: &Config, opts: IndexOptions) -> Result<IndexReport> {
    let scan = manual::scan_manual(&config.manual)?;
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = SqliteStore::new(pool.clone());

    let provider = if config.embedding.is_enabled() && !opts.dry_run {
        match embedding::create_provider(&config.embedding) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider unavailable, chunks left pending");
                None
            }
        }
    } else {
        None
    };

    let mut report = index_items(
        &store,
        provider.as_deref(),
        &scan,
        &config.chunking.options(),
        config.embedding.batch_size,
        opts,
    )
    .await?;

    if config.embedding.is_enabled() && provider.is_none() && !opts.dry_run {
        // Nothing can be embedded right now; count against the configured model.
        report.embeddings_pending = store
            .pending_chunks(
                config.embedding.model.as_deref().unwrap_or_default(),
                config.embedding.dims.unwrap_or_default(),
                None,
            )
            .await?
            .len();
    }

    pool.close().await;
    Ok(report)
}

/// `hrctl index`: run [`index_manual`] and print the report.
pub async fn run_index(config: &Config, opts: IndexOptions) -> Result<()> {
    let report = index_manual(config, opts).await?;

    if opts.dry_run {
        println!("index (dry-run)");
    } else {
        println!("index");
    }
    println!("  scanned: {}", report.scanned);
    println!("  indexed: {}", report.indexed);
    println!("  unchanged: {}", report.unchanged);
    println!("  removed: {}", report.removed);
    println!("  chunks written: {}", report.chunks);
    if config.embedding.is_enabled() {
        println!("  embeddings written: {}", report.embeddings_written);
        println!("  embeddings pending: {}", report.embeddings_pending);
    }
    println!("ok");
    Ok(())
}

/// Recompute-on-load: bring the index in line with the manual before use.
///
/// A missing manual directory is not fatal here; whatever was indexed
/// before stays searchable.
pub async fn ensure_index(config: &Config) -> Result<IndexReport> {
    if !config.manual.root.exists() {
        tracing::warn!(
            root = %config.manual.root.display(),
            "manual root missing, serving the existing index"
        );
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        pool.close().await;
        return Ok(IndexReport::default());
    }

    let report = index_manual(config, IndexOptions::default()).await?;
    if report.changed() {
        tracing::info!(
            indexed = report.indexed,
            removed = report.removed,
            chunks = report.chunks,
            "policy index rebuilt"
        );
    } else {
        tracing::info!(documents = report.unchanged, "policy index up to date");
    }
    Ok(report)
}

/// Store-level indexing of a manual scan.
///
/// Documents whose file could not be read this time keep their indexed
/// version; only files that are gone from the manual are removed.
pub async fn index_items(
    store: &dyn Store,
    provider: Option<&dyn Embedder>,
    scan: &ManualScan,
    chunking: &ChunkOptions,
    batch_size: usize,
    opts: IndexOptions,
) -> Result<IndexReport> {
    let mut report = IndexReport {
        scanned: scan.items.len(),
        ..IndexReport::default()
    };
    let now = chrono::Utc::now().timestamp();

    for item in &scan.items {
        let existing = store.find_document(&item.source, &item.source_id).await?;
        let dedup_hash = item.dedup_hash();
        if !opts.full && existing.is_some_and(|doc| doc.dedup_hash == dedup_hash) {
            report.unchanged += 1;
            continue;
        }

        let doc = item.to_document(now);
        let chunks = if item.is_markdown() {
            chunk_markdown(&doc.id, &doc.body, chunking)
        } else {
            chunk_text(&doc.id, &doc.body, chunking.max_tokens)
        };
        report.indexed += 1;
        report.chunks += chunks.len();

        if opts.dry_run {
            continue;
        }

        store.upsert_document(&doc).await?;
        store.replace_chunks(&doc.id, &chunks).await?;
        tracing::debug!(source_id = %item.source_id, chunks = chunks.len(), "indexed document");
    }

    let seen: HashSet<(&str, &str)> = scan
        .items
        .iter()
        .map(|i| (i.source.as_str(), i.source_id.as_str()))
        .chain(scan.unreadable.iter().map(|id| (manual::SOURCE, id.as_str())))
        .collect();
    for doc in store.list_documents().await? {
        if seen.contains(&(doc.source.as_str(), doc.source_id.as_str())) {
            continue;
        }
        report.removed += 1;
        if !opts.dry_run {
            store.delete_document(&doc.id).await?;
            tracing::debug!(source_id = %doc.source_id, "removed document");
        }
    }

    if let (Some(provider), false) = (provider, opts.dry_run) {
        let embedded = embed_cmd::backfill_pending(provider, store, batch_size).await?;
        report.embeddings_written = embedded.embedded;
        report.embeddings_pending = embedded.failed;
        if embedded.failed > 0 {
            tracing::warn!(pending = embedded.failed, "some chunks could not be embedded");
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceItem;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::Utc;
    use hr_assistant_core::embedding::{EmbeddingProvider, QueryEmbedding};
    use hr_assistant_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Constant vectors of a fixed size; can be switched to fail.
    struct TestEmbedder {
        model: &'static str,
        dims: usize,
        down: AtomicBool,
    }

    impl TestEmbedder {
        fn new(model: &'static str, dims: usize) -> Self {
            Self {
                model,
                dims,
                down: AtomicBool::new(false),
            }
        }
    }

    impl EmbeddingProvider for TestEmbedder {
        fn model_name(&self) -> &str {
            self.model
        }
        fn dims(&self) -> usize {
            self.dims
        }
    }

    #[async_trait]
    impl Embedder for TestEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.down.load(Ordering::SeqCst) {
                bail!("connection refused");
            }
            Ok(texts.iter().map(|_| vec![1.0; self.dims]).collect())
        }
    }

    fn scan(items: Vec<SourceItem>) -> ManualScan {
        ManualScan {
            items,
            unreadable: Vec::new(),
        }
    }

    fn item(source_id: &str, body: &str) -> SourceItem {
        SourceItem {
            source: manual::SOURCE.into(),
            source_id: source_id.into(),
            title: None,
            updated_at: Utc::now(),
            content_type: "text/markdown".into(),
            body: body.into(),
        }
    }

    async fn index(store: &InMemoryStore, items: &[SourceItem], opts: IndexOptions) -> IndexReport {
        let scan = scan(items.to_vec());
        index_items(store, None, &scan, &ChunkOptions::default(), 8, opts)
            .await
            .unwrap()
    }

    async fn index_with(
        store: &InMemoryStore,
        provider: &TestEmbedder,
        items: &[SourceItem],
    ) -> IndexReport {
        index_items(
            store,
            Some(provider),
            &scan(items.to_vec()),
            &ChunkOptions::default(),
            8,
            IndexOptions::default(),
        )
        .await
        .unwrap()
    }

    async fn vector_hits(store: &InMemoryStore, model: &str, dims: usize) -> usize {
        let query = vec![1.0; dims];
        let query = QueryEmbedding {
            model,
            vector: &query,
        };
        store.vector_search(query, 50).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_unchanged_documents_are_skipped() {
        let store = InMemoryStore::new();
        let items = vec![
            item("vacaciones.md", "# Vacaciones\n\n22 días laborables."),
            item("nominas.md", "# Nóminas\n\nSe pagan el último día del mes."),
        ];

        let first = index(&store, &items, IndexOptions::default()).await;
        assert_eq!(first.indexed, 2);
        assert!(first.chunks >= 2);

        let second = index(&store, &items, IndexOptions::default()).await;
        assert_eq!(second.indexed, 0);
        assert_eq!(second.unchanged, 2);
        assert!(!second.changed());

        let full = index(
            &store,
            &items,
            IndexOptions {
                full: true,
                ..IndexOptions::default()
            },
        )
        .await;
        assert_eq!(full.indexed, 2);
    }

    #[tokio::test]
    async fn test_edited_and_removed_documents() {
        let store = InMemoryStore::new();
        let items = vec![
            item("a.md", "# A\n\nuno"),
            item("b.md", "# B\n\ndos"),
        ];
        index(&store, &items, IndexOptions::default()).await;

        let edited = vec![item("a.md", "# A\n\nuno, revisado")];
        let report = index(&store, &edited, IndexOptions::default()).await;
        assert_eq!(report.indexed, 1);
        assert_eq!(report.removed, 1);

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_id, "a.md");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = InMemoryStore::new();
        let items = vec![item("a.md", "# A\n\nuno")];
        let report = index(
            &store,
            &items,
            IndexOptions {
                dry_run: true,
                ..IndexOptions::default()
            },
        )
        .await;
        assert_eq!(report.indexed, 1);
        assert!(store.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_keeps_its_indexed_version() {
        let store = InMemoryStore::new();
        let items = vec![item("a.md", "# A\n\nuno"), item("b.md", "# B\n\ndos")];
        index(&store, &items, IndexOptions::default()).await;

        let partial = ManualScan {
            items: vec![items[0].clone()],
            unreadable: vec!["b.md".into()],
        };
        let report = index_items(
            &store,
            None,
            &partial,
            &ChunkOptions::default(),
            8,
            IndexOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(store.list_documents().await.unwrap().len(), 2);
        assert_eq!(store.keyword_search("dos", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_backfills_chunks_left_pending() {
        let store = InMemoryStore::new();
        let items = vec![item("a.md", "# A\n\nuno\n\n# B\n\ndos")];
        let provider = TestEmbedder::new("m", 3);

        provider.down.store(true, Ordering::SeqCst);
        let first = index_with(&store, &provider, &items).await;
        assert_eq!(first.indexed, 1);
        assert_eq!(first.embeddings_written, 0);
        assert_eq!(first.embeddings_pending, first.chunks);
        assert_eq!(vector_hits(&store, "m", 3).await, 0);

        provider.down.store(false, Ordering::SeqCst);
        let second = index_with(&store, &provider, &items).await;
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.embeddings_written, first.chunks);
        assert_eq!(second.embeddings_pending, 0);
        assert_eq!(vector_hits(&store, "m", 3).await, first.chunks);

        let third = index_with(&store, &provider, &items).await;
        assert_eq!(third.embeddings_written, 0);
    }

    #[tokio::test]
    async fn test_model_change_reembeds_unchanged_documents() {
        let store = InMemoryStore::new();
        let items = vec![item("a.md", "# A\n\nuno\n\n# B\n\ndos")];
        let old = index_with(&store, &TestEmbedder::new("old", 2), &items).await;
        assert!(old.embeddings_written > 0);

        let new = index_with(&store, &TestEmbedder::new("new", 3), &items).await;
        assert_eq!(new.unchanged, 1);
        assert_eq!(new.embeddings_written, old.embeddings_written);
        assert_eq!(vector_hits(&store, "new", 3).await, old.embeddings_written);
        assert_eq!(vector_hits(&store, "old", 2).await, 0);
    }
}
