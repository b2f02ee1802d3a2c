/// Hybrid search: combine vector similarity and keyword/FTS results.
use std::collections::HashMap;

use crate::{config::CitationMode, embeddings::EmbeddingProvider, store::MemoryStore};

/// A search result with metadata.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: String,
    pub path: String,
    pub source: String,
    pub start_line: i64,
    pub end_line: i64,
    pub score: f32,
    pub text: String,
}

impl SearchResult {
    /// Format the result text with a citation appended.
    /// Format: `{text}\n\nSource: {path}#{start_line}`
    pub fn text_with_citation(&self) -> String {
        format!(
            "{}\n\nSource: {}#{}",
            self.text.trim(),
            self.path,
            self.start_line
        )
    }

    /// Determine whether to include citations based on mode and result set.
    pub fn should_include_citations(results: &[SearchResult], mode: CitationMode) -> bool {
        match mode {
            CitationMode::On => true,
            CitationMode::Off => false,
            CitationMode::Auto => {
                // Include citations if results come from multiple files
                if results.len() <= 1 {
                    return false;
                }
                let first_path = &results[0].path;
                results.iter().any(|r| r.path != *first_path)
            },
        }
    }
}

/// Perform hybrid search: embed the query, run vector + keyword search, merge with weights.
pub async fn hybrid_search(
    store: &dyn MemoryStore,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    limit: usize,
    vector_weight: f32,
    keyword_weight: f32,
) -> anyhow::Result<Vec<SearchResult>> {
    let query_embedding = embedder.embed(query).await?;

    let fetch_limit = limit * 3; // over-fetch for merging
    let vector_results = store.vector_search(&query_embedding, fetch_limit).await?;
    let keyword_results = store.keyword_search(query, fetch_limit).await?;

    let merged = merge_results(
        &vector_results,
        &keyword_results,
        vector_weight,
        keyword_weight,
    );

    let mut final_results: Vec<SearchResult> = merged.into_iter().take(limit).collect();

    // Fill in text for results that need it
    for result in &mut final_results {
        if result.text.is_empty()
            && let Some(chunk) = store.get_chunk_by_id(&result.chunk_id).await?
        {
            result.text = chunk.text;
        }
    }

    Ok(final_results)
}

/// Keyword-only search when no embedding provider is available.
pub async fn keyword_only_search(
    store: &dyn MemoryStore,
    query: &str,
    limit: usize,
) -> anyhow::Result<Vec<SearchResult>> {
    let mut results = store.keyword_search(query, limit).await?;

    for result in &mut results {
        if result.text.is_empty()
            && let Some(chunk) = store.get_chunk_by_id(&result.chunk_id).await?
        {
            result.text = chunk.text;
        }
    }

    Ok(results)
}

/// Merge vector and keyword results with weighted scores. Deduplicates by chunk_id.
fn merge_results(
    vector: &[SearchResult],
    keyword: &[SearchResult],
    vector_weight: f32,
    keyword_weight: f32,
) -> Vec<SearchResult> {
    let mut scores: HashMap<String, (f32, SearchResult)> = HashMap::new();

    for r in vector {
        let entry = scores.entry(r.chunk_id.clone()).or_insert((0.0, r.clone()));
        entry.0 += r.score * vector_weight;
    }

    for r in keyword {
        let entry = scores.entry(r.chunk_id.clone()).or_insert((0.0, r.clone()));
        entry.0 += r.score * keyword_weight;
    }

    let mut results: Vec<SearchResult> = scores
        .into_values()
        .map(|(score, mut r)| {
            r.score = score;
            r
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}
