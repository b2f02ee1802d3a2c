//! Top-level context engine: composes budget allocation, history selection,
//! rolling summarisation, and optional semantic retrieval into the model
//! input for one pending turn.

use relaykit_sessions::{SessionEntry, Summarizer};

use crate::{
    budget::{self, BudgetRatios},
    history::{self, RollingSummaryConfig},
    manager::MemoryManager,
};

/// Minimum relevance score a retrieved chunk must clear to be included.
const DEFAULT_MIN_RELEVANCE: f32 = 0.0;
/// Default cap on how many retrieved chunks are packed into one turn.
const DEFAULT_RETRIEVAL_CAP: usize = 5;
/// A final chunk is truncated to fit only if at least this many tokens survive.
const MIN_TRUNCATED_CHUNK_TOKENS: u32 = 100;
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub context_window: u32,
    pub ratios: BudgetRatios,
    pub min_response_tokens: u32,
    pub dm_history_limit: Option<usize>,
    pub rolling_summary: RollingSummaryConfig,
    pub preserve_recent_turns: usize,
    pub semantic_retrieval_enabled: bool,
    pub min_relevance_score: f32,
    pub retrieval_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_window: 200_000,
            ratios: BudgetRatios::default(),
            min_response_tokens: 1_000,
            dm_history_limit: None,
            rolling_summary: RollingSummaryConfig::default(),
            preserve_recent_turns: history::DEFAULT_PRESERVE_RECENT_TURNS,
            semantic_retrieval_enabled: false,
            min_relevance_score: DEFAULT_MIN_RELEVANCE,
            retrieval_cap: DEFAULT_RETRIEVAL_CAP,
        }
    }
}

/// The assembled input for a model call, as produced by the context engine.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub system_prompt: String,
    pub bootstrap: String,
    pub history: Vec<SessionEntry>,
    pub summary_prefix: Option<String>,
    pub retrieved_context: Option<String>,
    pub over_budget: bool,
}

fn approx_tokens(text: &str) -> u32 {
    (text.len() / CHARS_PER_TOKEN) as u32
}

/// Build the retrieved-context preamble from the top semantic-search
/// results, truncating or dropping the final chunk to fit `budget` tokens.
/// Returns `None` if nothing survives filtering.
fn build_retrieved_context(
    results: &[crate::search::SearchResult],
    min_relevance: f32,
    cap: usize,
    budget_tokens: u32,
) -> Option<String> {
    let filtered: Vec<&crate::search::SearchResult> = results
        .iter()
        .filter(|r| r.score >= min_relevance)
        .take(cap)
        .collect();
    if filtered.is_empty() {
        return None;
    }

    let mut packed: Vec<String> = Vec::new();
    let mut used = 0u32;
    for chunk in filtered {
        let text = chunk.text_with_citation();
        let cost = approx_tokens(&text);
        if used + cost <= budget_tokens {
            packed.push(text);
            used += cost;
            continue;
        }

        let remaining = budget_tokens.saturating_sub(used);
        if remaining < MIN_TRUNCATED_CHUNK_TOKENS {
            break;
        }
        let keep_chars = (remaining as usize) * CHARS_PER_TOKEN;
        let truncated: String = text.chars().take(keep_chars).collect();
        packed.push(truncated);
        break;
    }

    if packed.is_empty() {
        return None;
    }

    Some(format!(
        "<relevant-prior-context>\n{}\n</relevant-prior-context>",
        packed.join("\n\n")
    ))
}

/// Produce the model input for a pending turn.
///
/// `render_system_prompt`/`render_bootstrap` are supplied by the caller
/// (the agent runtime owns profile resolution); the engine only needs
/// their rendered text to size the budget reclamation.
#[allow(clippy::too_many_arguments)]
pub async fn build_model_input(
    config: &EngineConfig,
    system_prompt: String,
    bootstrap: String,
    history_entries: &[SessionEntry],
    summarizer: Option<&dyn Summarizer>,
    memory: Option<(&MemoryManager, &str)>,
) -> anyhow::Result<ModelInput> {
    let plan = budget::allocate(config.context_window, config.ratios, config.min_response_tokens);

    let system_prompt_tokens = approx_tokens(&system_prompt);
    let mut bootstrap_tokens = approx_tokens(&bootstrap);

    let retrieved_context = if config.semantic_retrieval_enabled
        && let Some((manager, query)) = memory
    {
        let results = manager.search(query, config.retrieval_cap.max(1)).await?;
        let remaining_bootstrap_budget = plan.bootstrap.saturating_sub(bootstrap_tokens);
        let ctx = build_retrieved_context(
            &results,
            config.min_relevance_score,
            config.retrieval_cap,
            remaining_bootstrap_budget,
        );
        if let Some(ref text) = ctx {
            bootstrap_tokens += approx_tokens(text);
        }
        ctx
    } else {
        None
    };

    let reclaimed = budget::reclaim(&plan, system_prompt_tokens, bootstrap_tokens);

    let selection = history::select_history(
        history_entries,
        config.dm_history_limit,
        &config.rolling_summary,
        config.preserve_recent_turns,
        reclaimed.history,
        config.context_window,
        summarizer,
    )
    .await?;

    if let Some(over) = reclaimed.over_budget {
        tracing::warn!(
            system_prompt_over = over.system_prompt_over,
            bootstrap_over = over.bootstrap_over,
            "context engine: system prompt or bootstrap exceeded its planned budget slice"
        );
    }

    Ok(ModelInput {
        system_prompt,
        bootstrap,
        history: selection.entries,
        summary_prefix: selection.summary_prefix,
        retrieved_context,
        over_budget: reclaimed.over_budget.is_some() || selection.over_budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchResult;

    fn result(id: &str, score: f32, text: &str) -> SearchResult {
        SearchResult {
            chunk_id: id.into(),
            path: "notes.md".into(),
            source: "longterm".into(),
            start_line: 1,
            end_line: 2,
            score,
            text: text.into(),
        }
    }

    #[test]
    fn retrieved_context_filters_by_min_relevance_and_caps_count() {
        let results = vec![result("a", 0.9, "alpha"), result("b", 0.1, "beta"), result("c", 0.8, "gamma")];
        let ctx = build_retrieved_context(&results, 0.5, 5, 10_000).unwrap();
        assert!(ctx.contains("alpha"));
        assert!(ctx.contains("gamma"));
        assert!(!ctx.contains("beta"));
        assert!(ctx.starts_with("<relevant-prior-context>"));
    }

    #[test]
    fn retrieved_context_drops_final_chunk_if_too_little_room_survives_truncation() {
        let long_text = "x".repeat(1000);
        let results = vec![result("a", 0.9, &long_text)];
        // Budget leaves less than 100 tokens once the chunk overflows it.
        let ctx = build_retrieved_context(&results, 0.0, 5, 10);
        assert!(ctx.is_none());
    }

    #[test]
    fn retrieved_context_returns_none_when_nothing_clears_the_relevance_bar() {
        let results = vec![result("a", 0.1, "alpha")];
        assert!(build_retrieved_context(&results, 0.5, 5, 10_000).is_none());
    }

    #[tokio::test]
    async fn build_model_input_without_retrieval_or_summarisation() {
        let config = EngineConfig {
            context_window: 200_000,
            ..Default::default()
        };
        let entries = vec![SessionEntry::user("hello"), SessionEntry::assistant("hi", "m", 0, 0)];
        let input = build_model_input(&config, "system".into(), "bootstrap".into(), &entries, None, None)
            .await
            .unwrap();
        assert_eq!(input.history.len(), 2);
        assert!(input.retrieved_context.is_none());
        assert!(!input.over_budget);
    }
}
