//! `hrctl search`: rank manual passages from the command line.

use anyhow::Result;
use std::str::FromStr;

use hr_assistant_core::search::SearchMode;

use crate::config::Config;
use crate::retriever::{PolicyRetriever, RetrieveOptions};

pub async fn run_search(
    config: &Config,
    query: &str,
    mode: Option<&str>,
    limit: Option<i64>,
    explain: bool,
) -> Result<()> {
    let mode = mode.map(SearchMode::from_str).transpose()?;

    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let retriever = PolicyRetriever::open(config).await?;
    let opts = RetrieveOptions {
        mode,
        limit,
        explain,
    };
    let results = retriever.retrieve(query, &opts).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {}",
            i + 1,
            result.score,
            result.heading.as_deref().unwrap_or("(sin sección)")
        );
        println!(
            "    document: {}",
            result.title.as_deref().unwrap_or(&result.source_id)
        );
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        if let Some(ref ex) = result.explain {
            println!(
                "    explain: keyword={:.3} semantic={:.3} alpha={:.2} (candidates: {} kw, {} vec)",
                ex.keyword_score,
                ex.semantic_score,
                ex.alpha,
                ex.keyword_candidates,
                ex.vector_candidates
            );
        }
        println!("    id: {}", result.document_id);
        println!();
    }

    Ok(())
}
