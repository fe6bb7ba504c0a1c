//! Idempotent schema setup for the policy index.
//!
//! | Table | Contents |
//! |-------|----------|
//! | `documents` | One row per manual file, with its dedup hash |
//! | `chunks` | Heading-scoped passages |
//! | `chunks_fts` | FTS5 index over heading and text, accent-insensitive |
//! | `embeddings` | Which model embedded each chunk, and from which text hash |
//! | `chunk_vectors` | The vectors themselves, little-endian `f32` blobs |

use anyhow::Result;
use sqlx::SqlitePool;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        source_id TEXT NOT NULL,
        title TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        content_type TEXT NOT NULL DEFAULT 'text/markdown',
        body TEXT NOT NULL,
        dedup_hash TEXT NOT NULL,
        UNIQUE(source, source_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        heading TEXT,
        text TEXT NOT NULL,
        hash TEXT NOT NULL,
        UNIQUE(document_id, chunk_index),
        FOREIGN KEY (document_id) REFERENCES documents(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS embeddings (
        chunk_id TEXT PRIMARY KEY,
        model TEXT NOT NULL,
        dims INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        hash TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunk_vectors (
        chunk_id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        embedding BLOB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_document_id ON chunk_vectors(document_id)",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in TABLES {
        sqlx::query(*statement).execute(pool).await?;
    }

    // FTS5 has no CREATE ... IF NOT EXISTS
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                document_id UNINDEXED,
                heading,
                text,
                tokenize = 'unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    tracing::debug!("schema up to date");
    Ok(())
}
