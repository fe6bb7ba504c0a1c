//! Hybrid keyword + semantic retrieval over a [`Store`].
//!
//! The algorithm has no database or configuration dependencies; callers
//! embed the query, build [`SearchParams`], and pass a store.
//!
//! # Hybrid scoring
//!
//! 1. Fetch `candidate_k_keyword` keyword candidates (BM25).
//! 2. Fetch `candidate_k_vector` vector candidates (cosine similarity),
//!    only from vectors of the query's model and length.
//! 3. Min-max normalise each set to `[0, 1]`.
//! 4. Merge per chunk: `score = (1 - α) × keyword + α × semantic`.
//! 5. Optionally keep only the best chunk per document ([`GroupBy::Document`]).
//! 6. Sort by score (desc), updated_at (desc), chunk id (asc).
//! 7. Truncate to `final_limit`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::QueryEmbedding;
use crate::store::{ChunkCandidate, DocumentMetadata, Store};

/// Which candidate sets feed the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn needs_embeddings(self) -> bool {
        !matches!(self, SearchMode::Keyword)
    }

    fn effective_alpha(self, hybrid_alpha: f64) -> f64 {
        match self {
            SearchMode::Keyword => 0.0,
            SearchMode::Semantic => 1.0,
            SearchMode::Hybrid => hybrid_alpha,
        }
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => bail!("Unknown search mode: {other}. Use keyword, semantic, or hybrid."),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        })
    }
}

/// Result granularity.
///
/// The HR manual is usually a single document, so per-chunk results are
/// the default; per-document grouping applies MAX aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Chunk,
    Document,
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Weight for semantic vs keyword: `hybrid = (1-α)*keyword + α*semantic`.
    pub hybrid_alpha: f64,
    pub candidate_k_keyword: i64,
    pub candidate_k_vector: i64,
    pub final_limit: i64,
    pub group_by: GroupBy,
}

/// Inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Query embedding, required for semantic and hybrid modes.
    pub query_vec: Option<QueryEmbedding<'a>>,
    pub mode: SearchMode,
    pub params: SearchParams,
    /// Populate [`ScoreExplanation`] on each result.
    pub explain: bool,
}

/// A ranked passage of the manual.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub heading: Option<String>,
    /// Relevance score in `[0.0, 1.0]`.
    pub score: f64,
    pub title: Option<String>,
    pub source: String,
    pub source_id: String,
    /// ISO 8601.
    pub updated_at: String,
    pub snippet: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// Scoring breakdown for a search result.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreExplanation {
    /// Normalized keyword score (0.0 if absent from keyword candidates).
    pub keyword_score: f64,
    /// Normalized semantic score (0.0 if absent from vector candidates).
    pub semantic_score: f64,
    pub alpha: f64,
    pub keyword_candidates: usize,
    pub vector_candidates: usize,
}

struct ScoredChunk<'c> {
    candidate: &'c ChunkCandidate,
    score: f64,
    keyword_score: f64,
    semantic_score: f64,
}

/// Run a search against any [`Store`] backend.
///
/// Every frontend (CLI, HTTP tools, MCP) goes through this function.
pub async fn search<S: Store + ?Sized>(
    store: &S,
    req: &SearchRequest<'_>,
) -> Result<Vec<SearchResultItem>> {
    if req.query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let keyword_candidates = if req.mode == SearchMode::Semantic {
        Vec::new()
    } else {
        store
            .keyword_search(req.query, req.params.candidate_k_keyword)
            .await?
    };

    let vector_candidates = if req.mode.needs_embeddings() {
        let Some(qv) = req.query_vec else {
            bail!("query_vec is required for semantic/hybrid mode");
        };
        store.vector_search(qv, req.params.candidate_k_vector).await?
    } else {
        Vec::new()
    };

    if keyword_candidates.is_empty() && vector_candidates.is_empty() {
        return Ok(Vec::new());
    }

    let alpha = req.mode.effective_alpha(req.params.hybrid_alpha);
    let mut scored = merge_candidates(&keyword_candidates, &vector_candidates, alpha);

    if req.params.group_by == GroupBy::Document {
        scored = best_per_document(scored);
    }

    let mut meta_cache: HashMap<String, Option<DocumentMetadata>> = HashMap::new();
    let mut results = Vec::with_capacity(scored.len());

    for sc in scored {
        let doc_id = &sc.candidate.document_id;
        if !meta_cache.contains_key(doc_id) {
            let meta = store.get_document_metadata(doc_id).await?;
            meta_cache.insert(doc_id.clone(), meta);
        }
        let Some(Some(meta)) = meta_cache.get(doc_id) else {
            continue;
        };

        let explain = req.explain.then(|| ScoreExplanation {
            keyword_score: sc.keyword_score,
            semantic_score: sc.semantic_score,
            alpha,
            keyword_candidates: keyword_candidates.len(),
            vector_candidates: vector_candidates.len(),
        });

        results.push(SearchResultItem {
            chunk_id: sc.candidate.chunk_id.clone(),
            document_id: meta.id.clone(),
            chunk_index: sc.candidate.chunk_index,
            heading: sc.candidate.heading.clone(),
            score: sc.score,
            title: meta.title.clone(),
            source: meta.source.clone(),
            source_id: meta.source_id.clone(),
            updated_at: format_ts_iso(meta.updated_at),
            snippet: sc.candidate.snippet.clone(),
            text: sc.candidate.text.clone(),
            explain,
        });
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(req.params.final_limit.max(0) as usize);

    Ok(results)
}

fn merge_candidates<'c>(
    keyword: &'c [ChunkCandidate],
    vector: &'c [ChunkCandidate],
    alpha: f64,
) -> Vec<ScoredChunk<'c>> {
    let kw_map: HashMap<&str, f64> = normalize_scores(keyword)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.as_str(), s))
        .collect();
    let vec_map: HashMap<&str, f64> = normalize_scores(vector)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.as_str(), s))
        .collect();

    let mut seen: HashMap<&str, &ChunkCandidate> = HashMap::new();
    for c in keyword.iter().chain(vector) {
        seen.entry(c.chunk_id.as_str()).or_insert(c);
    }

    seen.into_iter()
        .map(|(id, candidate)| {
            let k = kw_map.get(id).copied().unwrap_or(0.0);
            let v = vec_map.get(id).copied().unwrap_or(0.0);
            ScoredChunk {
                candidate,
                score: (1.0 - alpha) * k + alpha * v,
                keyword_score: k,
                semantic_score: v,
            }
        })
        .collect()
}

/// MAX aggregation: keep the highest-scoring chunk of each document.
fn best_per_document(scored: Vec<ScoredChunk<'_>>) -> Vec<ScoredChunk<'_>> {
    let mut best: HashMap<String, ScoredChunk<'_>> = HashMap::new();
    for sc in scored {
        let keep_existing = best.get(&sc.candidate.document_id).is_some_and(|e| {
            e.score > sc.score
                || (e.score == sc.score && e.candidate.chunk_id <= sc.candidate.chunk_id)
        });
        if !keep_existing {
            best.insert(sc.candidate.document_id.clone(), sc);
        }
    }
    best.into_values().collect()
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Min-max normalize raw scores to `[0.0, 1.0]`.
///
/// If all scores are equal, they are normalized to `1.0`.
pub fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<(&ChunkCandidate, f64)> {
    let (s_min, s_max) = candidates
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.raw_score), hi.max(c.raw_score))
        });
    let range = s_max - s_min;

    candidates
        .iter()
        .map(|c| {
            let norm = if range.abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / range
            };
            (c, norm)
        })
        .collect()
}
