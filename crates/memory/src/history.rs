//! History selection: which session entries make it into a turn's model
//! input, and in what form.
//!
//! Three strategies apply in priority order, first-applicable-wins:
//! a per-channel DM turn limit, rolling summarisation once history grows
//! past its trigger, and plain token-trimming as the fallback.

use relaykit_sessions::{SessionEntry, Summarizer};

/// Rolling-summarisation knobs, mirrored from `contextManagement.rollingSummary`.
#[derive(Debug, Clone, Copy)]
pub struct RollingSummaryConfig {
    pub enabled: bool,
    pub window_size: usize,
    pub trigger_threshold: u32,
}

impl Default for RollingSummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_size: 10,
            trigger_threshold: u32::MAX,
        }
    }
}

/// Default number of most-recent user turns kept verbatim even when the
/// turn is, on its own, larger than the history budget.
pub const DEFAULT_PRESERVE_RECENT_TURNS: usize = 5;

/// Largest share of the context window handed to the summariser in a
/// single call, so one oversized older turn can't blow its own budget.
const SUMMARY_CHUNK_SHARE: f64 = 0.30;

#[derive(Debug, Clone)]
pub struct HistorySelection {
    pub entries: Vec<SessionEntry>,
    /// Summary text covering folded older turns, if rolling summarisation ran.
    pub summary_prefix: Option<String>,
    /// Set when the fallback token-trim had to keep a turn larger than the budget,
    /// or when the summariser failed and selection fell back to pure trimming.
    pub over_budget: bool,
}

fn is_user(entry: &SessionEntry) -> bool {
    entry.kind() == "user"
}

/// Index of the start of the `n`th-from-last user turn. Returns `0` if
/// there are fewer than `n` user turns in `entries`.
fn nth_from_last_user_turn_start(entries: &[SessionEntry], n: usize) -> usize {
    if n == 0 {
        return entries.len();
    }
    let user_indices: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| is_user(e))
        .map(|(i, _)| i)
        .collect();
    if user_indices.len() <= n {
        return 0;
    }
    user_indices[user_indices.len() - n]
}

/// Tier 1: trim to the last `limit` user turns (and anything after the
/// boundary, so paired assistant/tool entries survive with their turn).
fn trim_to_dm_limit(entries: &[SessionEntry], limit: usize) -> Vec<SessionEntry> {
    let start = nth_from_last_user_turn_start(entries, limit);
    entries[start..].to_vec()
}

/// Tier 3: token-trim, always preserving the last `preserve_recent_turns`
/// user turns, then dropping oldest-first until the remainder fits
/// `budget` tokens, then advancing to the next user-role entry so the
/// surviving slice starts a turn.
fn token_trim(entries: &[SessionEntry], preserve_recent_turns: usize, budget: u32) -> (Vec<SessionEntry>, bool) {
    let floor = nth_from_last_user_turn_start(entries, preserve_recent_turns);
    let preserved = &entries[floor..];
    let preserved_tokens = relaykit_sessions::compaction::approximate_tokens(preserved);

    if preserved_tokens >= budget {
        // The preserved tail alone meets or exceeds budget; nothing older fits.
        return (preserved.to_vec(), preserved_tokens > budget);
    }

    let older = &entries[..floor];
    let mut drop_until = 0;
    let mut remaining_budget = budget - preserved_tokens;
    // Walk from the newest older entry backward, keeping as many as fit,
    // which is equivalent to dropping the oldest entries first.
    let mut kept_from = older.len();
    for (i, entry) in older.iter().enumerate().rev() {
        let cost = relaykit_sessions::compaction::approximate_tokens(std::slice::from_ref(entry));
        if cost > remaining_budget {
            drop_until = i + 1;
            break;
        }
        remaining_budget -= cost;
        kept_from = i;
    }
    let _ = drop_until;

    // Boundary alignment: advance forward to the next user-role entry.
    let mut start = kept_from;
    while start < older.len() && !is_user(&older[start]) {
        start += 1;
    }

    let mut selected = older[start..].to_vec();
    selected.extend(preserved.iter().cloned());
    (selected, false)
}

/// Select history for a turn, applying the three-tier priority chain.
///
/// `context_window` sizes the summariser's chunking; `history_budget` is
/// the `H` slice computed by [`crate::budget`].
pub async fn select_history(
    entries: &[SessionEntry],
    dm_history_limit: Option<usize>,
    rolling: &RollingSummaryConfig,
    preserve_recent_turns: usize,
    history_budget: u32,
    context_window: u32,
    summarizer: Option<&dyn Summarizer>,
) -> anyhow::Result<HistorySelection> {
    if let Some(limit) = dm_history_limit {
        let trimmed = trim_to_dm_limit(entries, limit);
        return Ok(HistorySelection {
            entries: trimmed,
            summary_prefix: None,
            over_budget: false,
        });
    }

    let total_tokens = relaykit_sessions::compaction::approximate_tokens(entries);
    let trigger = rolling.trigger_threshold.min((history_budget as f64 * 0.8) as u32);

    if rolling.enabled && total_tokens > trigger && let Some(summarizer) = summarizer {
        let split_at = nth_from_last_user_turn_start(entries, rolling.window_size);
        let older = &entries[..split_at];
        let recent = &entries[split_at..];

        if !older.is_empty() {
            match summarize_in_chunks(summarizer, older, context_window).await {
                Ok(summary) => {
                    return Ok(HistorySelection {
                        entries: recent.to_vec(),
                        summary_prefix: Some(summary),
                        over_budget: false,
                    });
                },
                Err(err) => {
                    tracing::warn!(error = %err, "rolling summariser failed, falling back to token-trim");
                    let (trimmed, over_budget) = token_trim(entries, preserve_recent_turns, history_budget);
                    return Ok(HistorySelection {
                        entries: trimmed,
                        summary_prefix: None,
                        over_budget,
                    });
                },
            }
        }
    }

    let (trimmed, over_budget) = token_trim(entries, preserve_recent_turns, history_budget);
    Ok(HistorySelection {
        entries: trimmed,
        summary_prefix: None,
        over_budget,
    })
}

/// Summarise `entries` in chunks no larger than 30% of the context window,
/// folding each chunk's summary into the next call so the final result
/// covers the whole span.
async fn summarize_in_chunks(
    summarizer: &dyn Summarizer,
    entries: &[SessionEntry],
    context_window: u32,
) -> anyhow::Result<String> {
    let chunk_token_limit = (context_window as f64 * SUMMARY_CHUNK_SHARE) as u32;
    let mut chunks: Vec<Vec<SessionEntry>> = Vec::new();
    let mut current: Vec<SessionEntry> = Vec::new();
    let mut current_tokens = 0u32;

    for entry in entries {
        let cost = relaykit_sessions::compaction::approximate_tokens(std::slice::from_ref(entry));
        if current_tokens + cost > chunk_token_limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += cost;
        current.push(entry.clone());
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let mut running_summary: Option<String> = None;
    for chunk in chunks {
        let mut to_summarize = chunk;
        if let Some(prior) = running_summary.take() {
            to_summarize.insert(0, SessionEntry::summary(prior, vec![], 0, "rolling"));
        }
        running_summary = Some(summarizer.summarize(&to_summarize).await?);
    }

    running_summary.ok_or_else(|| anyhow::anyhow!("no entries to summarize"))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    fn user(text: &str) -> SessionEntry {
        SessionEntry::user(text.to_string())
    }

    fn assistant(text: &str) -> SessionEntry {
        SessionEntry::assistant(text.to_string(), "test-model", 0, 0)
    }

    fn conversation(turns: usize) -> Vec<SessionEntry> {
        let mut entries = Vec::new();
        for i in 0..turns {
            entries.push(user(&format!("user turn {i}")));
            entries.push(assistant(&format!("assistant reply {i}")));
        }
        entries
    }

    #[tokio::test]
    async fn dm_history_limit_keeps_last_n_user_turns() {
        let entries = conversation(5);
        let result = select_history(&entries, Some(3), &RollingSummaryConfig::default(), 5, 1_000_000, 200_000, None)
            .await
            .unwrap();
        let user_count = result.entries.iter().filter(|e| is_user(e)).count();
        assert_eq!(user_count, 3);
        assert!(matches!(result.entries[0], SessionEntry::User { .. }));
    }

    #[tokio::test]
    async fn token_trim_preserves_recent_turns_even_over_budget() {
        let entries = conversation(3);
        // Budget of 1 token is smaller than even the last turn alone.
        let result = select_history(&entries, None, &RollingSummaryConfig::default(), 1, 1, 200_000, None)
            .await
            .unwrap();
        assert!(result.over_budget);
        assert!(result.entries.iter().any(|e| is_user(e)));
    }

    #[tokio::test]
    async fn token_trim_drops_oldest_first_and_realigns_to_a_user_turn() {
        let entries = conversation(10);
        let total = relaykit_sessions::compaction::approximate_tokens(&entries);
        // Budget big enough for the preserved tail plus a couple of older turns.
        let preserved_tokens =
            relaykit_sessions::compaction::approximate_tokens(&entries[entries.len() - 10..]);
        let budget = preserved_tokens + (total - preserved_tokens) / 3;
        let result = select_history(&entries, None, &RollingSummaryConfig::default(), 5, budget, 200_000, None)
            .await
            .unwrap();
        assert!(matches!(result.entries[0], SessionEntry::User { .. }));
    }

    struct StubSummarizer;

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, entries: &[SessionEntry]) -> relaykit_sessions::Result<String> {
            Ok(format!("summary of {} entries", entries.len()))
        }
    }

    #[tokio::test]
    async fn rolling_summary_replaces_older_entries_with_a_summary_prefix() {
        let entries = conversation(20);
        let rolling = RollingSummaryConfig {
            enabled: true,
            window_size: 2,
            trigger_threshold: 1,
        };
        let result = select_history(&entries, None, &rolling, 5, 1_000_000, 200_000, Some(&StubSummarizer))
            .await
            .unwrap();
        assert!(result.summary_prefix.is_some());
        let user_count = result.entries.iter().filter(|e| is_user(e)).count();
        assert_eq!(user_count, 2);
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _entries: &[SessionEntry]) -> relaykit_sessions::Result<String> {
            Err(relaykit_sessions::Error::message("model unavailable"))
        }
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back_to_token_trim_never_to_nothing() {
        let entries = conversation(20);
        let rolling = RollingSummaryConfig {
            enabled: true,
            window_size: 2,
            trigger_threshold: 1,
        };
        let result = select_history(&entries, None, &rolling, 5, 1_000_000, 200_000, Some(&FailingSummarizer))
            .await
            .unwrap();
        assert!(result.summary_prefix.is_none());
        assert!(!result.entries.is_empty());
    }
}
