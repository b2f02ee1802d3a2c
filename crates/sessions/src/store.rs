use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::PathBuf,
};

use fd_lock::RwLock;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single search hit within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub session_key: String,
    pub snippet: String,
    pub role: String,
    pub message_index: usize,
}

/// Append-only JSONL session storage with file locking and dense, gap-checked
/// sequence numbers. Each stored line carries a `seq` field assigned by
/// [`Self::append`]; [`Self::read`] treats a hole in that sequence as
/// corruption rather than silently skipping it.
pub struct SessionStore {
    pub base_dir: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Sanitize a session key for use as a filename.
    pub fn key_to_filename(key: &str) -> String {
        key.replace(':', "_")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.jsonl", Self::key_to_filename(key)))
    }

    /// Directory for session media files (screenshots, audio, etc.).
    fn media_dir_for(&self, key: &str) -> PathBuf {
        self.base_dir.join("media").join(Self::key_to_filename(key))
    }

    /// Save a media file for a session. Returns the relative path from base_dir.
    pub async fn save_media(&self, key: &str, filename: &str, data: &[u8]) -> Result<String> {
        let dir = self.media_dir_for(key);
        let file_path = dir.join(filename);
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || -> Result<()> {
            fs::create_dir_all(&dir)?;
            fs::write(&file_path, &data)?;
            Ok(())
        })
        .await??;

        let sanitized = Self::key_to_filename(key);
        Ok(format!("media/{sanitized}/{filename}"))
    }

    /// Read a media file. Returns raw bytes.
    pub async fn read_media(&self, key: &str, filename: &str) -> Result<Vec<u8>> {
        let file_path = self.media_dir_for(key).join(filename);

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let data = fs::read(&file_path)?;
            Ok(data)
        })
        .await?
    }

    /// Append an entry (JSON value) as a single line to the session file,
    /// stamping it with the next dense sequence number. Returns the assigned
    /// sequence number.
    pub async fn append(&self, key: &str, message: &serde_json::Value) -> Result<u64> {
        let path = self.path_for(key);
        let key_owned = key.to_string();
        let mut message = message.clone();

        tokio::task::spawn_blocking(move || -> Result<u64> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&path)?;
            let mut lock = RwLock::new(file);
            let mut guard = lock
                .write()
                .map_err(|e| Error::lock_failed(e.to_string()))?;

            let last_seq = last_sequence(&guard, &key_owned)?;
            let seq = last_seq + 1;
            if let Some(obj) = message.as_object_mut() {
                obj.insert("seq".to_string(), serde_json::Value::from(seq));
            }
            let line = serde_json::to_string(&message)?;
            writeln!(*guard, "{line}")?;
            Ok(seq)
        })
        .await?
    }

    /// Read all entries from a session file, in sequence order.
    ///
    /// Returns [`Error::SessionCorrupted`] if a gap is found in the `seq`
    /// field of consecutive entries.
    pub async fn read(&self, key: &str) -> Result<Vec<serde_json::Value>> {
        let path = self.path_for(key);
        let key_owned = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<serde_json::Value>> {
            if !path.exists() {
                return Ok(vec![]);
            }
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let mut messages = Vec::new();
            let mut expected: u64 = 1;
            for line in reader.lines() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<serde_json::Value>(trimmed) {
                    Ok(val) => {
                        if let Some(seq) = val.get("seq").and_then(|v| v.as_u64()) {
                            if seq != expected {
                                return Err(Error::SessionCorrupted {
                                    session_key: key_owned.clone(),
                                    at_seq: expected,
                                });
                            }
                            expected += 1;
                        }
                        messages.push(val);
                    },
                    Err(e) => {
                        tracing::warn!("skipping malformed JSONL line: {e}");
                    },
                }
            }
            Ok(messages)
        })
        .await?
    }

    /// Read the last N messages from a session file.
    pub async fn read_last_n(&self, key: &str, n: usize) -> Result<Vec<serde_json::Value>> {
        let all = self.read(key).await?;
        let start = all.len().saturating_sub(n);
        Ok(all[start..].to_vec())
    }

    /// Delete the session file and its media directory.
    pub async fn clear(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        let media_dir = self.media_dir_for(key);

        tokio::task::spawn_blocking(move || -> Result<()> {
            if path.exists() {
                fs::remove_file(&path)?;
            }
            if media_dir.exists() {
                let _ = fs::remove_dir_all(&media_dir);
            }
            Ok(())
        })
        .await??;

        Ok(())
    }

    /// List all session keys by scanning JSONL files in the base directory.
    pub fn list_keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.base_dir) else {
            return vec![];
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_suffix(".jsonl").map(|s| s.replace('_', ":"))
            })
            .collect()
    }

    /// Search all sessions for entries containing `query` (case-insensitive).
    /// Returns up to `max_results` hits, at most one per session. Skips
    /// sessions that fail the sequence-gap check rather than propagating it.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let base = self.base_dir.clone();
        let query = query.to_lowercase();

        tokio::task::spawn_blocking(move || -> Result<Vec<SearchResult>> {
            let mut results = Vec::new();
            let entries = fs::read_dir(&base)?;

            for entry in entries.flatten() {
                if results.len() >= max_results {
                    break;
                }
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(key_raw) = name.strip_suffix(".jsonl") else {
                    continue;
                };
                let session_key = key_raw.replace('_', ":");

                let Ok(file) = File::open(&path) else {
                    continue;
                };
                let reader = BufReader::new(file);
                for (idx, line) in reader.lines().enumerate() {
                    let Ok(line) = line else {
                        continue;
                    };
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let Ok(val) = serde_json::from_str::<serde_json::Value>(trimmed) else {
                        continue;
                    };
                    let content = content_text(&val);
                    if content.to_lowercase().contains(&query) {
                        let role = val.get("type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();

                        let lower = content.to_lowercase();
                        let pos = lower.find(&query).unwrap_or(0);
                        let start = pos.saturating_sub(40);
                        let end = (pos + query.len() + 60).min(content.len());
                        let snippet = content[start..end].to_string();

                        results.push(SearchResult {
                            session_key: session_key.clone(),
                            snippet,
                            role,
                            message_index: idx,
                        });
                        break;
                    }
                }
            }

            Ok(results)
        })
        .await?
    }

    /// Replace the entire session history with the given entries, renumbering
    /// their sequence numbers densely from 1. Used after compaction.
    pub async fn replace_history(&self, key: &str, messages: Vec<serde_json::Value>) -> Result<()> {
        let path = self.path_for(key);

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?;
            let mut lock = RwLock::new(file);
            let mut guard = lock
                .write()
                .map_err(|e| Error::lock_failed(e.to_string()))?;
            for (idx, msg) in messages.into_iter().enumerate() {
                let mut msg = msg;
                if let Some(obj) = msg.as_object_mut() {
                    obj.insert("seq".to_string(), serde_json::Value::from(idx as u64 + 1));
                }
                let line = serde_json::to_string(&msg)?;
                writeln!(*guard, "{line}")?;
            }
            Ok(())
        })
        .await??;

        Ok(())
    }

    /// Count entries in a session file without parsing them.
    pub async fn count(&self, key: &str) -> Result<u32> {
        let path = self.path_for(key);

        tokio::task::spawn_blocking(move || -> Result<u32> {
            if !path.exists() {
                return Ok(0);
            }
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let count = reader
                .lines()
                .map_while(std::result::Result::ok)
                .filter(|l| !l.trim().is_empty())
                .count();
            Ok(count as u32)
        })
        .await?
    }
}

fn content_text(val: &serde_json::Value) -> String {
    match val.get("content") {
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => val.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string(),
    }
}

/// Scan a just-opened, already-locked file for the highest `seq` value.
fn last_sequence(file: &File, key: &str) -> Result<u64> {
    let reader = BufReader::new(file);
    let mut last = 0u64;
    let mut expected = 1u64;
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(val) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        if let Some(seq) = val.get("seq").and_then(|v| v.as_u64()) {
            if seq != expected {
                return Err(Error::SessionCorrupted {
                    session_key: key.to_string(),
                    at_seq: expected,
                });
            }
            last = seq;
            expected += 1;
        }
    }
    Ok(last)
}
