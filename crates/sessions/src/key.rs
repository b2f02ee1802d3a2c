//! The session-key grammar:
//!
//! ```text
//! agent:(main|sub):<provider>:(dm|group|channel):<userId>(:thread:<nat>)?
//! ```
//!
//! `provider` is lowercase alphanumeric; `userId` is provider-opaque (any
//! non-empty run of characters without `:`); the thread suffix is optional.

use std::fmt;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentScope {
    Main,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Dm,
    Group,
    Channel,
}

/// A parsed, validated session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub scope: AgentScope,
    pub provider: String,
    pub kind: ConversationKind,
    pub user_id: String,
    pub thread: Option<u64>,
    raw: String,
}

impl SessionKey {
    /// Parse and validate a session key string against the grammar.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 5 && parts.len() != 7 {
            return Err(Error::message(format!("malformed session key: {raw}")));
        }
        if parts[0] != "agent" {
            return Err(Error::message(format!(
                "session key must start with \"agent:\": {raw}"
            )));
        }

        let scope = match parts[1] {
            "main" => AgentScope::Main,
            "sub" => AgentScope::Sub,
            other => {
                return Err(Error::message(format!(
                    "invalid agent scope \"{other}\" in session key: {raw}"
                )));
            },
        };

        let provider = parts[2];
        if provider.is_empty() || !provider.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(Error::message(format!(
                "provider must be lowercase alphanumeric: {raw}"
            )));
        }

        let kind = match parts[3] {
            "dm" => ConversationKind::Dm,
            "group" => ConversationKind::Group,
            "channel" => ConversationKind::Channel,
            other => {
                return Err(Error::message(format!(
                    "invalid conversation kind \"{other}\" in session key: {raw}"
                )));
            },
        };

        let user_id = parts[4];
        if user_id.is_empty() {
            return Err(Error::message(format!("empty userId in session key: {raw}")));
        }

        let thread = if parts.len() == 7 {
            if parts[5] != "thread" {
                return Err(Error::message(format!(
                    "expected \"thread\" suffix in session key: {raw}"
                )));
            }
            let n: u64 = parts[6]
                .parse()
                .map_err(|_| Error::message(format!("thread suffix must be a natural number: {raw}")))?;
            Some(n)
        } else {
            None
        };

        Ok(Self {
            scope,
            provider: provider.to_string(),
            kind,
            user_id: user_id.to_string(),
            thread,
            raw: raw.to_string(),
        })
    }

    /// Filesystem-safe form used by the session store (`:` replaced with `_`).
    pub fn safe_filename(&self) -> String {
        self.raw.replace(':', "_")
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
