//! In-memory [`Store`] used by tests and embedders of the core crate.
//!
//! Keyword search is Okapi BM25 over [`tokenize`]d heading and text, so its
//! ranking follows the same shape as SQLite FTS5's `bm25()`. Vector search is
//! brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, QueryEmbedding};
use crate::models::{Chunk, Document};
use crate::search::format_ts_iso;
use crate::text::{snippet, tokenize};

use super::{ChunkCandidate, ChunkResponse, DocumentMetadata, DocumentResponse, Store};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;
const SNIPPET_CHARS: usize = 240;

struct IndexedChunk {
    chunk: Chunk,
    terms: Vec<String>,
}

struct StoredVector {
    chunk_id: String,
    document_id: String,
    model: String,
    /// Hash of the chunk the vector was computed from.
    hash: String,
    vector: Vec<f32>,
}

impl StoredVector {
    fn is_current(&self, chunk: &Chunk, model: &str, dims: usize) -> bool {
        self.model == model && self.vector.len() == dims && self.hash == chunk.hash
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<IndexedChunk>>,
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn metadata(doc: &Document) -> DocumentMetadata {
    DocumentMetadata {
        id: doc.id.clone(),
        title: doc.title.clone(),
        source: doc.source.clone(),
        source_id: doc.source_id.clone(),
        updated_at: doc.updated_at,
        dedup_hash: doc.dedup_hash.clone(),
    }
}

fn candidate(chunk: &Chunk, raw_score: f64) -> ChunkCandidate {
    ChunkCandidate {
        chunk_id: chunk.id.clone(),
        document_id: chunk.document_id.clone(),
        chunk_index: chunk.chunk_index,
        heading: chunk.heading.clone(),
        raw_score,
        snippet: snippet(&chunk.text, SNIPPET_CHARS),
        text: chunk.text.clone(),
    }
}

fn sort_and_truncate(candidates: &mut Vec<ChunkCandidate>, limit: i64) {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(limit.max(0) as usize);
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        write(&self.docs)?.insert(doc.id.clone(), doc.clone());
        Ok(doc.id.clone())
    }

    async fn find_document(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<DocumentMetadata>> {
        Ok(read(&self.docs)?
            .values()
            .find(|d| d.source == source && d.source_id == source_id)
            .map(metadata))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentMetadata>> {
        let mut docs: Vec<DocumentMetadata> = read(&self.docs)?.values().map(metadata).collect();
        docs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(docs)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let removed = write(&self.docs)?.remove(id).is_some();
        write(&self.chunks)?.retain(|c| c.chunk.document_id != id);
        write(&self.vectors)?.retain(|v| v.document_id != id);
        Ok(removed)
    }

    async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut stored = write(&self.chunks)?;
        stored.retain(|c| c.chunk.document_id != doc_id);
        stored.extend(chunks.iter().map(|c| IndexedChunk {
            terms: tokenize(&c.embedding_input()),
            chunk: c.clone(),
        }));
        write(&self.vectors)?.retain(|v| v.document_id != doc_id);
        Ok(())
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        doc_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()> {
        let mut vecs = write(&self.vectors)?;
        vecs.retain(|v| v.chunk_id != chunk_id);
        vecs.push(StoredVector {
            chunk_id: chunk_id.to_string(),
            document_id: doc_id.to_string(),
            model: model.to_string(),
            hash: content_hash.to_string(),
            vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn pending_chunks(
        &self,
        model: &str,
        dims: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Chunk>> {
        let chunks = read(&self.chunks)?;
        let vecs = read(&self.vectors)?;
        let current: HashMap<&str, &StoredVector> =
            vecs.iter().map(|v| (v.chunk_id.as_str(), v)).collect();

        let mut pending: Vec<Chunk> = chunks
            .iter()
            .filter(|c| {
                !current
                    .get(c.chunk.id.as_str())
                    .is_some_and(|v| v.is_current(&c.chunk, model, dims))
            })
            .map(|c| c.chunk.clone())
            .collect();
        pending.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        Ok(pending)
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>> {
        let docs = read(&self.docs)?;
        let Some(doc) = docs.get(id) else {
            return Ok(None);
        };

        let mut chunks: Vec<ChunkResponse> = read(&self.chunks)?
            .iter()
            .filter(|c| c.chunk.document_id == id)
            .map(|c| ChunkResponse {
                index: c.chunk.chunk_index,
                heading: c.chunk.heading.clone(),
                text: c.chunk.text.clone(),
            })
            .collect();
        chunks.sort_by_key(|c| c.index);

        Ok(Some(DocumentResponse {
            id: doc.id.clone(),
            source: doc.source.clone(),
            source_id: doc.source_id.clone(),
            title: doc.title.clone(),
            created_at: format_ts_iso(doc.created_at),
            updated_at: format_ts_iso(doc.updated_at),
            content_type: doc.content_type.clone(),
            body: doc.body.clone(),
            chunks,
        }))
    }

    async fn get_document_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        Ok(read(&self.docs)?.get(id).map(metadata))
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<ChunkCandidate>> {
        let mut query_terms = tokenize(query);
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = read(&self.chunks)?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let n = chunks.len() as f64;
        let avg_len = chunks.iter().map(|c| c.terms.len()).sum::<usize>() as f64 / n;

        let idf: HashMap<&str, f64> = query_terms
            .iter()
            .map(|t| {
                let df = chunks.iter().filter(|c| c.terms.contains(t)).count() as f64;
                (t.as_str(), ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();

        let mut candidates: Vec<ChunkCandidate> = chunks
            .iter()
            .filter_map(|c| {
                let len = c.terms.len() as f64;
                let score: f64 = query_terms
                    .iter()
                    .map(|t| {
                        let tf = c.terms.iter().filter(|term| *term == t).count() as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * len / avg_len.max(1.0));
                        idf[t.as_str()] * tf * (BM25_K1 + 1.0) / (tf + norm)
                    })
                    .sum();
                (score > 0.0).then(|| candidate(&c.chunk, score))
            })
            .collect();

        sort_and_truncate(&mut candidates, limit);
        Ok(candidates)
    }

    async fn vector_search(
        &self,
        query: QueryEmbedding<'_>,
        limit: i64,
    ) -> Result<Vec<ChunkCandidate>> {
        let vecs = read(&self.vectors)?;
        let chunks = read(&self.chunks)?;
        let by_id: HashMap<&str, &Chunk> = chunks
            .iter()
            .map(|c| (c.chunk.id.as_str(), &c.chunk))
            .collect();

        let mut candidates: Vec<ChunkCandidate> = vecs
            .iter()
            .filter_map(|v| {
                let chunk = by_id.get(v.chunk_id.as_str())?;
                if !v.is_current(chunk, query.model, query.vector.len()) {
                    return None;
                }
                let sim = cosine_similarity(query.vector, &v.vector) as f64;
                Some(candidate(chunk, sim))
            })
            .collect();

        sort_and_truncate(&mut candidates, limit);
        Ok(candidates)
    }
}
