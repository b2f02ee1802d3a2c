//! Session storage and management.
//!
//! Sessions are stored as JSONL files (one entry per line) under
//! `<dataDir>/sessions/<sessionKey>.jsonl`, with file locking for concurrent
//! access and a dense, gap-checked sequence number per entry.

pub mod compaction;
pub mod error;
pub mod key;
pub mod message;
pub mod metadata;
pub mod store;

pub use {
    compaction::{CompactionPlan, Summarizer, plan_compaction},
    error::{Context, Error, Result},
    key::{AgentScope, ConversationKind, SessionKey},
    message::{Attachment, ContentBlock, MessageContent, SessionEntry},
    metadata::SessionMetadata,
    store::{SearchResult, SessionStore},
};
