//! Shared wire-adjacent types used by more than one crate.

use serde::{Deserialize, Serialize};

/// An outbound payload a channel adapter can deliver besides plain text.
///
/// Mirrors the `attachments` shape carried on inbound messages (§3 Data
/// Model) so adapters can round-trip media without each one inventing its
/// own representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyPayload {
    Text {
        text: String,
    },
    Image {
        url: String,
        caption: Option<String>,
    },
    File {
        url: String,
        filename: String,
        mime_type: Option<String>,
    },
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}
