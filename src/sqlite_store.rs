//! SQLite-backed [`Store`].
//!
//! Keyword search runs on the `chunks_fts` FTS5 table, vector search is a
//! brute-force cosine scan over `chunk_vectors`. The manual is small enough
//! (hundreds of chunks) that a full scan stays well under a millisecond per
//! query.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use hr_assistant_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, QueryEmbedding};
use hr_assistant_core::models::{Chunk, Document};
use hr_assistant_core::search::format_ts_iso;
use hr_assistant_core::store::{
    ChunkCandidate, ChunkResponse, DocumentMetadata, DocumentResponse, Store,
};
use hr_assistant_core::text::{snippet, tokenize};

const SNIPPET_CHARS: usize = 240;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Turn free text into an FTS5 expression: folded terms, quoted, OR-joined.
///
/// Quoting keeps user punctuation (`¿`, `?`, `-`, `"`) from being parsed as
/// FTS5 syntax. Returns `None` when the query has no searchable terms.
pub fn fts_query(query: &str) -> Option<String> {
    let mut terms = tokenize(query);
    terms.sort();
    terms.dedup();
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn metadata_from_row(r: &SqliteRow) -> DocumentMetadata {
    DocumentMetadata {
        id: r.get("id"),
        title: r.get("title"),
        source: r.get("source"),
        source_id: r.get("source_id"),
        updated_at: r.get("updated_at"),
        dedup_hash: r.get("dedup_hash"),
    }
}

const METADATA_COLUMNS: &str = "id, title, source, source_id, updated_at, dedup_hash";

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, source, source_id, title, created_at, updated_at,
                                   content_type, body, dedup_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, source_id) DO UPDATE SET
                title = excluded.title,
                updated_at = excluded.updated_at,
                content_type = excluded.content_type,
                body = excluded.body,
                dedup_hash = excluded.dedup_hash
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.source)
        .bind(&doc.source_id)
        .bind(&doc.title)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .bind(&doc.content_type)
        .bind(&doc.body)
        .bind(&doc.dedup_hash)
        .execute(&self.pool)
        .await?;

        Ok(doc.id.clone())
    }

    async fn find_document(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<DocumentMetadata>> {
        let row = sqlx::query(&format!(
            "SELECT {METADATA_COLUMNS} FROM documents WHERE source = ? AND source_id = ?"
        ))
        .bind(source)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(metadata_from_row))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentMetadata>> {
        let rows = sqlx::query(&format!(
            "SELECT {METADATA_COLUMNS} FROM documents ORDER BY source_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(metadata_from_row).collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
        )
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, heading, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(doc_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.heading)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunks_fts (chunk_id, document_id, heading, text) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(doc_id)
            .bind(chunk.heading.as_deref().unwrap_or(""))
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
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
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO embeddings (chunk_id, model, dims, created_at, hash)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                created_at = excluded.created_at,
                hash = excluded.hash
            "#,
        )
        .bind(chunk_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(now)
        .bind(content_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, document_id, embedding)
            VALUES (?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                embedding = excluded.embedding
            "#,
        )
        .bind(chunk_id)
        .bind(doc_id)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn pending_chunks(
        &self,
        model: &str,
        dims: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Chunk>> {
        let limit_val = limit.map(|l| l as i64).unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.heading, c.text, c.hash
            FROM chunks c
            LEFT JOIN embeddings e ON e.chunk_id = c.id
            WHERE e.chunk_id IS NULL OR e.model != ? OR e.dims != ? OR e.hash != c.hash
            ORDER BY c.document_id, c.chunk_index
            LIMIT ?
            "#,
        )
        .bind(model)
        .bind(dims as i64)
        .bind(limit_val)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Chunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                heading: row.get("heading"),
                text: row.get("text"),
                hash: row.get("hash"),
            })
            .collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>> {
        let Some(doc_row) = sqlx::query(
            "SELECT id, source, source_id, title, created_at, updated_at, content_type, body FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let chunk_rows = sqlx::query(
            "SELECT chunk_index, heading, text FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let chunks = chunk_rows
            .iter()
            .map(|row| ChunkResponse {
                index: row.get("chunk_index"),
                heading: row.get("heading"),
                text: row.get("text"),
            })
            .collect();

        Ok(Some(DocumentResponse {
            id: doc_row.get("id"),
            source: doc_row.get("source"),
            source_id: doc_row.get("source_id"),
            title: doc_row.get("title"),
            created_at: format_ts_iso(doc_row.get("created_at")),
            updated_at: format_ts_iso(doc_row.get("updated_at")),
            content_type: doc_row.get("content_type"),
            body: doc_row.get("body"),
            chunks,
        }))
    }

    async fn get_document_metadata(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        let row = sqlx::query(&format!(
            "SELECT {METADATA_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(metadata_from_row))
    }

    async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<ChunkCandidate>> {
        let Some(expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        // Heading matches weigh double; bm25() is lower-is-better.
        let rows = sqlx::query(
            r#"
            SELECT chunks_fts.chunk_id AS chunk_id,
                   chunks_fts.document_id AS document_id,
                   bm25(chunks_fts, 0.0, 0.0, 2.0, 1.0) AS score,
                   snippet(chunks_fts, 3, '>>>', '<<<', '...', 48) AS snippet,
                   c.chunk_index AS chunk_index,
                   c.heading AS heading,
                   c.text AS text
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY score
            LIMIT ?
            "#,
        )
        .bind(&expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let score: f64 = row.get("score");
                ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    heading: row.get("heading"),
                    raw_score: -score,
                    snippet: row.get("snippet"),
                    text: row.get("text"),
                }
            })
            .collect())
    }

    async fn vector_search(
        &self,
        query: QueryEmbedding<'_>,
        limit: i64,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.embedding,
                   c.chunk_index, c.heading, c.text
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN embeddings e ON e.chunk_id = cv.chunk_id
            WHERE e.model = ? AND e.dims = ? AND e.hash = c.hash
            "#,
        )
        .bind(query.model)
        .bind(query.vector.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .filter_map(|row| {
                let vector = blob_to_vec(&row.get::<Vec<u8>, _>("embedding"));
                // dims is recorded from the vector itself, but a truncated
                // blob would still decode short
                if vector.len() != query.vector.len() {
                    return None;
                }
                let text: String = row.get("text");
                Some(ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    heading: row.get("heading"),
                    raw_score: cosine_similarity(query.vector, &vector) as f64,
                    snippet: snippet(&text, SNIPPET_CHARS),
                    text,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit.max(0) as usize);

        Ok(candidates)
    }
}
