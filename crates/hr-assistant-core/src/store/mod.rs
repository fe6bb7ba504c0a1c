//! Storage abstraction for the policy index.
//!
//! The [`Store`] trait covers everything indexing and hybrid search need,
//! so the same search code runs against SQLite in the application and
//! against [`memory::InMemoryStore`] in tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::QueryEmbedding;
use crate::models::{Chunk, Document};

/// A chunk returned by keyword or vector search, with a backend score.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub heading: Option<String>,
    /// BM25 score (higher is better) or cosine similarity.
    pub raw_score: f64,
    pub snippet: String,
    /// Full chunk text, handed to the language model as context.
    pub text: String,
}

/// A document with all of its chunks.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub source: String,
    pub source_id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub content_type: String,
    pub body: String,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub index: i64,
    pub heading: Option<String>,
    pub text: String,
}

/// Document fields needed to enrich search results and detect changes.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub id: String,
    pub title: Option<String>,
    pub source: String,
    pub source_id: String,
    pub updated_at: i64,
    pub dedup_hash: String,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or update a document by id |
/// | [`find_document`](Store::find_document) | Look up a document by source and source id |
/// | [`list_documents`](Store::list_documents) | Metadata of every indexed document |
/// | [`delete_document`](Store::delete_document) | Remove a document with its chunks and vectors |
/// | [`replace_chunks`](Store::replace_chunks) | Replace a document's chunks, dropping their vectors |
/// | [`upsert_embedding`](Store::upsert_embedding) | Store a chunk vector |
/// | [`pending_chunks`](Store::pending_chunks) | Chunks without a current vector for a model |
/// | [`keyword_search`](Store::keyword_search) | Lexical candidates |
/// | [`vector_search`](Store::vector_search) | Cosine-similarity candidates |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a document. Returns its id.
    async fn upsert_document(&self, doc: &Document) -> Result<String>;

    async fn find_document(&self, source: &str, source_id: &str)
        -> Result<Option<DocumentMetadata>>;

    async fn list_documents(&self) -> Result<Vec<DocumentMetadata>>;

    /// Returns `false` when no document had that id.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Replace all chunks of a document. Existing vectors for the document
    /// are dropped.
    async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()>;

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        doc_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()>;

    /// Chunks with no vector from `model`, a vector of a length other than
    /// `dims`, or a vector embedded from an older version of the chunk.
    /// Ordered by document and chunk index.
    async fn pending_chunks(
        &self,
        model: &str,
        dims: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Chunk>>;

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>>;

    async fn get_document_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>>;

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<ChunkCandidate>>;

    /// Only vectors from `query.model`, of the query's length, and embedded
    /// from the chunk's current hash are scored.
    async fn vector_search(
        &self,
        query: QueryEmbedding<'_>,
        limit: i64,
    ) -> Result<Vec<ChunkCandidate>>;
}
