//! Mechanics for folding old session entries into a rolling summary.
//!
//! The actual LLM call that turns a run of entries into summary text lives
//! in the context engine (`relaykit-memory`), which depends on this crate
//! and calls back in via [`Summarizer`]. This module only decides *which*
//! entries to fold and how to splice the result back into the log — pure,
//! dependency-free logic that's easy to test without a model.

use async_trait::async_trait;

use crate::message::SessionEntry;

/// Implemented by the context engine's summarizer. Kept here, rather than
/// depending on `relaykit-memory` directly, to avoid a cycle: memory already
/// depends on sessions for `SessionEntry` and `SessionStore`.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, entries: &[SessionEntry]) -> crate::Result<String>;
}

/// A plan for compacting a session: which entries to fold into a summary and
/// which to keep verbatim.
pub struct CompactionPlan {
    pub to_fold: Vec<SessionEntry>,
    pub to_keep: Vec<SessionEntry>,
    pub fold_seqs: Vec<u64>,
}

/// Build a compaction plan that folds every entry before the most recent
/// `keep_last_turns` turns, skipping entries already covered by a prior
/// summary.
///
/// A "turn" here is a `User` or `Assistant` entry; `tool_call`/`tool_result`
/// pairs attached to a kept turn are kept with it.
pub fn plan_compaction(entries: &[(u64, SessionEntry)], keep_last_turns: usize) -> CompactionPlan {
    let turn_boundaries: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, (_, e))| matches!(e, SessionEntry::User { .. } | SessionEntry::Assistant { .. }))
        .map(|(i, _)| i)
        .collect();

    if turn_boundaries.len() <= keep_last_turns {
        return CompactionPlan {
            to_fold: Vec::new(),
            to_keep: entries.iter().map(|(_, e)| e.clone()).collect(),
            fold_seqs: Vec::new(),
        };
    }

    let split_at = turn_boundaries[turn_boundaries.len() - keep_last_turns];
    let mut to_fold = Vec::new();
    let mut to_keep = Vec::new();
    let mut fold_seqs = Vec::new();

    for (i, (seq, entry)) in entries.iter().enumerate() {
        if matches!(entry, SessionEntry::Summary { .. }) {
            to_keep.push(entry.clone());
        } else if i < split_at {
            to_fold.push(entry.clone());
            fold_seqs.push(*seq);
        } else {
            to_keep.push(entry.clone());
        }
    }

    CompactionPlan { to_fold, to_keep, fold_seqs }
}

/// Approximate token count for sizing the compaction trigger: about four
/// characters per token, close enough for a budget check.
pub fn approximate_tokens(entries: &[SessionEntry]) -> u32 {
    entries
        .iter()
        .map(|e| match e {
            SessionEntry::User { content: crate::message::MessageContent::Text(t), .. } => t.len(),
            SessionEntry::Assistant { content, .. } => content.len(),
            SessionEntry::ToolCall { arguments, .. } => arguments.to_string().len(),
            SessionEntry::ToolResult { result, .. } => result.as_ref().map(|r| r.to_string().len()).unwrap_or(0),
            SessionEntry::Summary { text, .. } => text.len(),
            _ => 0,
        })
        .sum::<usize>()
        .div_ceil(4) as u32
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn user(i: u64) -> (u64, SessionEntry) {
        (i, SessionEntry::user(format!("turn {i}")))
    }

    #[test]
    fn plan_keeps_everything_under_threshold() {
        let entries = vec![user(1), user(2)];
        let plan = plan_compaction(&entries, 5);
        assert!(plan.to_fold.is_empty());
        assert_eq!(plan.to_keep.len(), 2);
    }

    #[test]
    fn plan_folds_older_turns() {
        let entries: Vec<_> = (1..=10).map(user).collect();
        let plan = plan_compaction(&entries, 2);
        assert_eq!(plan.to_keep.len(), 2);
        assert_eq!(plan.to_fold.len(), 8);
        assert_eq!(plan.fold_seqs.len(), 8);
    }

    #[test]
    fn plan_never_folds_prior_summaries() {
        let mut entries = vec![(1, SessionEntry::summary("prior", vec![1], 100, "model"))];
        entries.extend((2..=6).map(user));
        let plan = plan_compaction(&entries, 1);
        assert!(plan.to_keep.iter().any(|e| matches!(e, SessionEntry::Summary { .. })));
    }

    #[test]
    fn approximate_tokens_scales_with_text_length() {
        let entries = vec![SessionEntry::assistant("a".repeat(400), "m", 0, 0)];
        assert_eq!(approximate_tokens(&entries), 100);
    }
}
