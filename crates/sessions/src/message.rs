//! Typed entries for the append-only session log.
//!
//! The entry `type` tag is one of `user`, `assistant`, `tool_call`,
//! `tool_result`, or `summary` — the exact set the Data Model specifies.
//! Each entry carries the dense sequence number assigned by
//! [`crate::store::SessionStore::append`].

use serde::{Deserialize, Serialize};

/// An entry stored in a session JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEntry {
    User {
        content: MessageContent,
        #[serde(skip_serializing_if = "Option::is_none")]
        attachments: Option<Vec<Attachment>>,
        created_at: u64,
    },
    Assistant {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(rename = "inputTokens", skip_serializing_if = "Option::is_none")]
        input_tokens: Option<u32>,
        #[serde(rename = "outputTokens", skip_serializing_if = "Option::is_none")]
        output_tokens: Option<u32>,
        created_at: u64,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
        created_at: u64,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        created_at: u64,
    },
    /// A rolling summary, appended as a distinguished history entry. May be
    /// superseded by a newer summary covering a larger prefix.
    Summary {
        text: String,
        covers_turns: Vec<u64>,
        original_tokens: u32,
        model: String,
        created_at: u64,
    },
}

/// User message content: plain text or multimodal array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Multimodal(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// An inbound attachment, as carried on a channel adapter's ingress payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl SessionEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: MessageContent::Text(text.into()),
            attachments: None,
            created_at: now_ms(),
        }
    }

    pub fn user_with_attachments(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self::User {
            content: MessageContent::Text(text.into()),
            attachments: if attachments.is_empty() {
                None
            } else {
                Some(attachments)
            },
            created_at: now_ms(),
        }
    }

    pub fn assistant(text: impl Into<String>, model: impl Into<String>, input_tokens: u32, output_tokens: u32) -> Self {
        Self::Assistant {
            content: text.into(),
            model: Some(model.into()),
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            created_at: now_ms(),
        }
    }

    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            arguments,
            created_at: now_ms(),
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        success: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            success,
            result,
            error,
            created_at: now_ms(),
        }
    }

    pub fn summary(text: impl Into<String>, covers_turns: Vec<u64>, original_tokens: u32, model: impl Into<String>) -> Self {
        Self::Summary {
            text: text.into(),
            covers_turns,
            original_tokens,
            model: model.into(),
            created_at: now_ms(),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("SessionEntry serialization cannot fail")
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Summary { .. } => "summary",
        }
    }
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_base64(media_type: &str, data: &str) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{media_type};base64,{data}"),
            },
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
