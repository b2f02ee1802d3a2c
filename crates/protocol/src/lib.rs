//! Gateway WebSocket/RPC protocol definitions.
//!
//! Protocol version 1. All communication uses JSON frames over WebSocket.
//! A connection opens with a three-step handshake (`hello` / `challenge` /
//! `proof`) before any `method_call` frame is accepted; after the handshake
//! the connection exchanges `method_call` / `response` / `event` / `error`
//! frames until closed.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB
pub const MAX_BUFFERED_BYTES: usize = 1_572_864; // 1.5 MB
pub const TICK_INTERVAL_MS: u64 = 30_000; // 30s
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // 10s
pub const DEDUPE_TTL_MS: u64 = 300_000; // 5 min
pub const DEDUPE_MAX_ENTRIES: usize = 1_000;
/// Minimum entropy of a handshake challenge nonce, in bytes.
pub const NONCE_BYTES: usize = 16;

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const UNKNOWN_DEVICE: &str = "UNKNOWN_DEVICE";
    pub const BAD_SIGNATURE: &str = "BAD_SIGNATURE";
    pub const HANDSHAKE_TIMEOUT: &str = "HANDSHAKE_TIMEOUT";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
    pub const SLOW_CONSUMER: &str = "SLOW_CONSUMER";
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
    pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
    pub const SCOPE_DENIED: &str = "SCOPE_DENIED";
    pub const LANE_BUSY: &str = "LANE_BUSY";
    pub const AGENT_TIMEOUT: &str = "AGENT_TIMEOUT";
    pub const SESSION_CORRUPTED: &str = "SESSION_CORRUPTED";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(rename = "retryAfterMs", skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: None,
            retry_after_ms: None,
        }
    }

    #[must_use]
    pub fn retryable(mut self, after_ms: u64) -> Self {
        self.retryable = Some(true);
        self.retry_after_ms = Some(after_ms);
        self
    }
}

// ── Handshake frames ─────────────────────────────────────────────────────────

/// First frame sent by the client: `hello {role, publicKey?, token?}`.
///
/// `role` is the identity this connection is claiming (`operator`, `node`,
/// or a channel id). A device proves a `publicKey` by signing the
/// challenge nonce; an operator/channel proves a pairing `token` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloFrame {
    pub role: String,
    #[serde(rename = "publicKey", skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Server's response to `hello`: a nonce the client must sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeFrame {
    pub nonce: String,
    #[serde(rename = "connId")]
    pub conn_id: String,
}

/// Client's response to the challenge: a device signature, or a pairing
/// token re-asserted for the record (the gateway already saw it in `hello`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofFrame {
    /// Base64 Ed25519 signature over the challenge nonce (device role).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Sent by the gateway once the handshake completes successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEstablished {
    pub protocol: u32,
    pub server: ServerInfo,
    pub policy: Policy,
    pub role: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    #[serde(rename = "connId")]
    pub conn_id: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(rename = "maxPayload")]
    pub max_payload: usize,
    #[serde(rename = "maxBufferedBytes")]
    pub max_buffered_bytes: usize,
    #[serde(rename = "tickIntervalMs")]
    pub tick_interval_ms: u64,
}

impl Policy {
    pub fn default_policy() -> Self {
        Self {
            max_payload: MAX_PAYLOAD_BYTES,
            max_buffered_bytes: MAX_BUFFERED_BYTES,
            tick_interval_ms: TICK_INTERVAL_MS,
        }
    }
}

// ── Post-handshake frames ────────────────────────────────────────────────────

/// Client → gateway RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCallFrame {
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Gateway → client RPC result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Gateway → client server-push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub topic: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub seq: u64,
}

impl EventFrame {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: serde_json::Value, seq: u64) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload: Some(payload),
            seq,
        }
    }
}

/// A connection-level error not tied to any in-flight `method_call`
/// (handshake failure, payload-too-large, slow-consumer disconnect).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(flatten)]
    pub error: ErrorShape,
}

/// Discriminated union of every frame kind carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    Hello(HelloFrame),
    Challenge(ChallengeFrame),
    Proof(ProofFrame),
    SessionEstablished(SessionEstablished),
    MethodCall(MethodCallFrame),
    Response(ResponseFrame),
    Event(EventFrame),
    Error(ErrorFrame),
}

// ── Roles and scopes ─────────────────────────────────────────────────────────

pub mod roles {
    pub const OPERATOR: &str = "operator";
    pub const NODE: &str = "node";
}

pub mod scopes {
    pub const ADMIN: &str = "operator.admin";
    pub const READ: &str = "operator.read";
    pub const WRITE: &str = "operator.write";
    pub const APPROVALS: &str = "operator.approvals";
    pub const PAIRING: &str = "operator.pairing";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tag_round_trips() {
        let frame = GatewayFrame::MethodCall(MethodCallFrame {
            id: "1".into(),
            method: "agent.invoke".into(),
            params: None,
        });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"method_call\""));
        let back: GatewayFrame = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, GatewayFrame::MethodCall(_)));
    }

    #[test]
    fn error_shape_retryable_sets_both_fields() {
        let err = ErrorShape::new(error_codes::LANE_BUSY, "lane full").retryable(500);
        assert_eq!(err.retryable, Some(true));
        assert_eq!(err.retry_after_ms, Some(500));
    }

    #[test]
    fn default_policy_matches_constants() {
        let policy = Policy::default_policy();
        assert_eq!(policy.max_payload, MAX_PAYLOAD_BYTES);
        assert_eq!(policy.tick_interval_ms, TICK_INTERVAL_MS);
    }
}
