//! Pairing tokens: single-use bearer credentials scoped to a role, used by
//! operators, nodes, and channels that cannot hold a device keypair (or are
//! being enrolled for the first time).

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Roles a pairing token may be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairingRole {
    Operator,
    Node,
    Channel,
    ReadOnly,
}

impl PairingRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Node => "node",
            Self::Channel => "channel",
            Self::ReadOnly => "read-only",
        }
    }
}

struct PairingEntry {
    hash: [u8; 32],
    role: PairingRole,
    expires_at: u64,
    consumed: bool,
}

/// In-memory registry of outstanding pairing tokens. Tokens are stored
/// hashed; the bearer value is returned once, at issuance, and never again.
#[derive(Default)]
pub struct PairingStore {
    entries: Vec<PairingEntry>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn hash_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

impl PairingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new token, returning the plaintext bearer value. The caller
    /// is responsible for delivering it out of band (QR code, CLI printout).
    pub fn issue(&mut self, role: PairingRole, ttl_secs: u64) -> String {
        let mut bytes = [0u8; 24];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes);

        self.entries.push(PairingEntry {
            hash: hash_token(&token),
            role,
            expires_at: now_secs() + ttl_secs,
            consumed: false,
        });

        token
    }

    /// Consume a token: validates it is known, unexpired, and unused, then
    /// marks it used and returns its role. Subsequent calls with the same
    /// token fail with `PairingRequired`.
    pub fn consume(&mut self, token: &str) -> Result<PairingRole> {
        let hash = hash_token(token);
        let now = now_secs();

        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.hash == hash)
            .ok_or_else(|| Error::message("unknown pairing token"))?;

        if entry.consumed {
            return Err(Error::message("pairing token already consumed"));
        }
        if entry.expires_at < now {
            return Err(Error::message("pairing token expired"));
        }

        entry.consumed = true;
        Ok(entry.role)
    }

    /// Drop expired and consumed entries older than their TTL window.
    pub fn sweep(&mut self) {
        let now = now_secs();
        self.entries.retain(|e| !e.consumed && e.expires_at >= now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Helper used by tests and the CLI's one-time pairing hint: formats a
/// `{role -> count}` summary, useful for diagnostics without ever exposing
/// the hash or the bearer value.
pub fn summarize(store: &PairingStore) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for entry in &store.entries {
        *counts.entry(entry.role.as_str()).or_insert(0) += 1;
    }
    counts
}
