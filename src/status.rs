//! `hrctl status`: what is indexed and where the records live.
//!
//! Answers "is the assistant ready?" without starting the server: manual
//! files on disk, documents and chunks in the index, embedding coverage,
//! and whether each record file exists.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::manual::manual_status;
use crate::migrate;

pub async fn run_status(config: &Config) -> Result<()> {
    let manual = manual_status(&config.manual);

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;
    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;
    // Vectors from another model or of another length are not coverage.
    let total_embedded: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM chunks c
        JOIN embeddings e ON e.chunk_id = c.id AND e.hash = c.hash
        WHERE (?1 IS NULL OR e.model = ?1) AND (?2 IS NULL OR e.dims = ?2)
        "#,
    )
    .bind(config.embedding.model.as_deref())
    .bind(config.embedding.dims.map(|d| d as i64))
    .fetch_one(&pool)
    .await?;
    let last_updated: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM documents")
        .fetch_one(&pool)
        .await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("HR Assistant Status");
    println!("===================");
    println!();
    println!(
        "  Manual:      {} ({})",
        manual.root.display(),
        if manual.exists {
            format!("{} files", manual.files)
        } else {
            "missing".to_string()
        }
    );
    println!(
        "  Database:    {} ({})",
        config.db.path.display(),
        format_bytes(db_size)
    );
    println!("  Documents:   {}", total_docs);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_embedded,
        total_chunks,
        if total_chunks > 0 {
            (total_embedded * 100) / total_chunks
        } else {
            0
        }
    );
    println!(
        "  Embeddings:  {}",
        if config.embedding.is_enabled() {
            config.embedding.provider.to_string()
        } else {
            "disabled (keyword search only)".to_string()
        }
    );
    println!(
        "  Updated:     {}",
        last_updated
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    println!();

    println!("  Records ({}):", config.records.data_dir.display());
    let records = &config.records;
    for path in [
        records.employees_path(),
        records.vacation_requests_path(),
        records.sick_leaves_path(),
        records.payroll_path(),
    ] {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let state = if path.exists() { "ok" } else { "missing" };
        println!("    {:<32} {}", name, state);
    }
    println!();

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
