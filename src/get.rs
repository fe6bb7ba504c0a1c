//! `hrctl get`: print an indexed document with its chunks.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;
use hr_assistant_core::store::Store;

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let doc = store.get_document(id).await;
    pool.close().await;
    let doc = doc?.with_context(|| format!("document not found: {}", id))?;

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!(
        "title:        {}",
        doc.title.as_deref().unwrap_or("(untitled)")
    );
    println!("source:       {}", doc.source);
    println!("source_id:    {}", doc.source_id);
    println!("created_at:   {}", doc.created_at);
    println!("updated_at:   {}", doc.updated_at);
    println!("content_type: {}", doc.content_type);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for chunk in &doc.chunks {
        match chunk.heading {
            Some(ref h) => println!("[chunk {}] {}", chunk.index, h),
            None => println!("[chunk {}]", chunk.index),
        }
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}
