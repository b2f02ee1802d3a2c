//! The context engine's implementation of `relaykit_sessions::Summarizer`:
//! turns a run of session entries into summary text via a model call.

use async_trait::async_trait;
use relaykit_agents::model::LlmProvider;
use relaykit_sessions::SessionEntry;

/// Preserves what a later turn is most likely to need back: decisions made,
/// questions left open, stated preferences, and work still pending.
const PRESERVATION_PROMPT: &str = "\
Summarize the conversation excerpt below for your own future reference. \
Preserve: key decisions made, open questions, stated preferences, and any \
pending tasks. Be concise; omit pleasantries and restated context.";

/// Summarizes session entries by rendering them to a transcript and asking
/// a model to condense it, using the preservation prompt above.
pub struct ModelSummarizer {
    provider: std::sync::Arc<dyn LlmProvider>,
}

impl ModelSummarizer {
    pub fn new(provider: std::sync::Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

/// Render entries as a plain-text transcript for the summarizer prompt.
/// Tool calls/results are included so operational context isn't lost.
fn render_transcript(entries: &[SessionEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        match entry {
            SessionEntry::User {
                content: relaykit_sessions::MessageContent::Text(text),
                ..
            } => {
                out.push_str("User: ");
                out.push_str(text);
                out.push('\n');
            },
            SessionEntry::User { .. } => {
                out.push_str("User: [multimodal message]\n");
            },
            SessionEntry::Assistant { content, .. } => {
                out.push_str("Assistant: ");
                out.push_str(content);
                out.push('\n');
            },
            SessionEntry::ToolCall {
                tool_name,
                arguments,
                ..
            } => {
                out.push_str(&format!("Tool call [{tool_name}]: {arguments}\n"));
            },
            SessionEntry::ToolResult {
                tool_name, success, ..
            } => {
                out.push_str(&format!(
                    "Tool result [{tool_name}]: {}\n",
                    if *success { "ok" } else { "failed" }
                ));
            },
            SessionEntry::Summary { text, .. } => {
                out.push_str("Prior summary: ");
                out.push_str(text);
                out.push('\n');
            },
        }
    }
    out
}

#[async_trait]
impl relaykit_sessions::Summarizer for ModelSummarizer {
    async fn summarize(&self, entries: &[SessionEntry]) -> relaykit_sessions::Result<String> {
        let transcript = render_transcript(entries);
        let messages = vec![
            serde_json::json!({"role": "system", "content": PRESERVATION_PROMPT}),
            serde_json::json!({"role": "user", "content": transcript}),
        ];

        let response = self
            .provider
            .complete(&messages, &[])
            .await
            .map_err(|err| relaykit_sessions::Error::message(err.to_string()))?;

        response
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| relaykit_sessions::Error::message("summarizer returned an empty response"))
    }
}
