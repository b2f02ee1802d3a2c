//! JSON-backed index of per-session metadata: active model override, token
//! counters, rolling-summary handle, lane/tool-call bookkeeping, and the
//! sliding-window counter backing the cross-session rate limit.

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A single session's metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub key: String,
    pub lane: String,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    /// Depth of currently-open tool_call → tool_result pairs; used to check
    /// the paired invariant before allowing a new turn to start.
    #[serde(default)]
    pub tool_call_depth: u32,
    /// Timestamps (ms) of recent cross-session-tool invocations, used as a
    /// sliding window for the per-session rate limit.
    #[serde(default)]
    pub cross_session_invocations: Vec<u64>,
    #[serde(default)]
    pub rolling_summary_seq: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub version: u64,
}

impl SessionEntry {
    fn new(key: &str, lane: &str) -> Self {
        let now = now_ms();
        Self {
            key: key.to_string(),
            lane: lane.to_string(),
            model_override: None,
            input_tokens: 0,
            output_tokens: 0,
            tool_call_depth: 0,
            cross_session_invocations: Vec::new(),
            rolling_summary_seq: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Prune invocation timestamps outside the given window and return the
    /// count still inside it.
    pub fn rate_in_window(&mut self, window_ms: u64) -> usize {
        let cutoff = now_ms().saturating_sub(window_ms);
        self.cross_session_invocations.retain(|&t| t >= cutoff);
        self.cross_session_invocations.len()
    }

    pub fn record_invocation(&mut self) {
        self.cross_session_invocations.push(now_ms());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_ms();
        self.version += 1;
    }
}

/// JSON file-backed index mapping session key → `SessionEntry`.
pub struct SessionMetadata {
    path: PathBuf,
    entries: HashMap<String, SessionEntry>,
}

impl SessionMetadata {
    pub fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&SessionEntry> {
        self.entries.get(key)
    }

    /// Get or create the entry for `key`, assigning it to `lane` if new.
    pub fn entry_mut(&mut self, key: &str, lane: &str) -> &mut SessionEntry {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| SessionEntry::new(key, lane))
    }

    pub fn set_model_override(&mut self, key: &str, lane: &str, model: Option<String>) {
        let entry = self.entry_mut(key, lane);
        entry.model_override = model;
        entry.touch();
    }

    pub fn record_usage(&mut self, key: &str, lane: &str, input_tokens: u64, output_tokens: u64) {
        let entry = self.entry_mut(key, lane);
        entry.input_tokens += input_tokens;
        entry.output_tokens += output_tokens;
        entry.touch();
    }

    pub fn set_rolling_summary_seq(&mut self, key: &str, lane: &str, seq: u64) {
        let entry = self.entry_mut(key, lane);
        entry.rolling_summary_seq = Some(seq);
        entry.touch();
    }

    /// Checks the paired tool_call/tool_result invariant: a turn may not
    /// start while a prior tool call is still awaiting its result.
    pub fn open_tool_call(&mut self, key: &str, lane: &str) -> Result<()> {
        let entry = self.entry_mut(key, lane);
        if entry.tool_call_depth > 0 {
            return Err(Error::message(format!(
                "session {key} has an unresolved tool_call (depth {})",
                entry.tool_call_depth
            )));
        }
        entry.tool_call_depth += 1;
        entry.touch();
        Ok(())
    }

    pub fn close_tool_call(&mut self, key: &str, lane: &str) {
        let entry = self.entry_mut(key, lane);
        entry.tool_call_depth = entry.tool_call_depth.saturating_sub(1);
        entry.touch();
    }

    pub fn remove(&mut self, key: &str) -> Option<SessionEntry> {
        self.entries.remove(key)
    }

    pub fn list(&self) -> Vec<&SessionEntry> {
        self.entries.values().collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn temp_metadata() -> (SessionMetadata, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        (SessionMetadata::load(path).unwrap(), dir)
    }

    #[test]
    fn creates_entry_on_first_access() {
        let (mut meta, _dir) = temp_metadata();
        let entry = meta.entry_mut("agent:main:telegram:dm:u1", "default");
        assert_eq!(entry.lane, "default");
        assert_eq!(entry.version, 0);
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        {
            let mut meta = SessionMetadata::load(path.clone()).unwrap();
            meta.record_usage("s1", "default", 100, 50);
            meta.save().unwrap();
        }
        let meta = SessionMetadata::load(path).unwrap();
        let entry = meta.get("s1").unwrap();
        assert_eq!(entry.input_tokens, 100);
        assert_eq!(entry.output_tokens, 50);
    }

    #[test]
    fn tool_call_depth_rejects_reentry() {
        let (mut meta, _dir) = temp_metadata();
        meta.open_tool_call("s1", "default").unwrap();
        assert!(meta.open_tool_call("s1", "default").is_err());
        meta.close_tool_call("s1", "default");
        assert!(meta.open_tool_call("s1", "default").is_ok());
    }

    #[test]
    fn rate_window_prunes_old_invocations() {
        let (mut meta, _dir) = temp_metadata();
        let entry = meta.entry_mut("s1", "default");
        entry.cross_session_invocations.push(0); // far in the past
        entry.record_invocation();
        let count = meta.entry_mut("s1", "default").rate_in_window(60_000);
        assert_eq!(count, 1);
    }
}
