//! Service trait interfaces for the gateway's RPC surface.
//!
//! Each trait covers exactly the methods exposed on the wire (see
//! `gateway::methods`). A `Noop*` implementation is provided for every
//! trait so the gateway can boot and answer `config.get`/`node.list`/etc.
//! before every domain crate is wired in.

use {async_trait::async_trait, serde_json::Value};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Message { message: String },
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl ServiceError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }
}

impl From<String> for ServiceError {
    fn from(value: String) -> Self {
        Self::message(value)
    }
}

impl From<&str> for ServiceError {
    fn from(value: &str) -> Self {
        Self::message(value)
    }
}

impl From<ServiceError> for relaykit_protocol::ErrorShape {
    fn from(err: ServiceError) -> Self {
        Self::new(relaykit_protocol::error_codes::UNAVAILABLE, err.to_string())
    }
}

pub type ServiceResult<T = Value> = Result<T, ServiceError>;

// ── Agent runtime: agent.invoke / agent.wait / agent.cancel ─────────────────

#[async_trait]
pub trait AgentService: Send + Sync {
    /// `agent.invoke` — start a turn, returns immediately with a turn id.
    async fn invoke(&self, params: Value) -> ServiceResult;
    /// `agent.wait` — block (on the caller's connection) until the turn ends.
    async fn wait(&self, params: Value) -> ServiceResult;
    /// `agent.cancel` — abort an in-flight turn.
    async fn cancel(&self, params: Value) -> ServiceResult;
}

pub struct NoopAgentService;

#[async_trait]
impl AgentService for NoopAgentService {
    async fn invoke(&self, _params: Value) -> ServiceResult {
        Err("agent runtime not configured".into())
    }

    async fn wait(&self, _params: Value) -> ServiceResult {
        Err("agent runtime not configured".into())
    }

    async fn cancel(&self, _params: Value) -> ServiceResult {
        Err("agent runtime not configured".into())
    }
}

// ── Chat: chat.history, send.outbound ────────────────────────────────────────

#[async_trait]
pub trait ChatService: Send + Sync {
    /// `chat.history` — the primary session's rendered entries.
    async fn history(&self, params: Value) -> ServiceResult;
    /// `send.outbound` — operator-authored message into the primary session.
    async fn send_outbound(&self, params: Value) -> ServiceResult;
}

pub struct NoopChatService;

#[async_trait]
impl ChatService for NoopChatService {
    async fn history(&self, _params: Value) -> ServiceResult {
        Ok(serde_json::json!([]))
    }

    async fn send_outbound(&self, _params: Value) -> ServiceResult {
        Err("chat service not configured".into())
    }
}

// ── Sessions: sessions.list / sessions.history / sessions.send ──────────────

#[async_trait]
pub trait SessionsService: Send + Sync {
    async fn list(&self, params: Value) -> ServiceResult;
    async fn history(&self, params: Value) -> ServiceResult;
    async fn send(&self, params: Value) -> ServiceResult;
}

pub struct NoopSessionsService;

#[async_trait]
impl SessionsService for NoopSessionsService {
    async fn list(&self, _params: Value) -> ServiceResult {
        Ok(serde_json::json!([]))
    }

    async fn history(&self, _params: Value) -> ServiceResult {
        Ok(serde_json::json!([]))
    }

    async fn send(&self, _params: Value) -> ServiceResult {
        Err("session store not configured".into())
    }
}

// ── Config: config.get / config.update / config.reload ──────────────────────

#[async_trait]
pub trait ConfigService: Send + Sync {
    async fn get(&self, params: Value) -> ServiceResult;
    async fn update(&self, params: Value) -> ServiceResult;
    async fn reload(&self, params: Value) -> ServiceResult;
}

pub struct NoopConfigService;

#[async_trait]
impl ConfigService for NoopConfigService {
    async fn get(&self, _params: Value) -> ServiceResult {
        Ok(serde_json::json!({}))
    }

    async fn update(&self, _params: Value) -> ServiceResult {
        Err("config service not configured".into())
    }

    async fn reload(&self, _params: Value) -> ServiceResult {
        Err("config service not configured".into())
    }
}

// ── Channels: channels.status / channels.restart ─────────────────────────────

#[async_trait]
pub trait ChannelsService: Send + Sync {
    async fn status(&self, params: Value) -> ServiceResult;
    async fn restart(&self, params: Value) -> ServiceResult;
}

pub struct NoopChannelsService;

#[async_trait]
impl ChannelsService for NoopChannelsService {
    async fn status(&self, _params: Value) -> ServiceResult {
        Ok(serde_json::json!({ "channels": [] }))
    }

    async fn restart(&self, _params: Value) -> ServiceResult {
        Err("no channels configured".into())
    }
}

// ── Nodes: node.list / node.describe / node.invoke ───────────────────────────

#[async_trait]
pub trait NodeService: Send + Sync {
    async fn list(&self, params: Value) -> ServiceResult;
    async fn describe(&self, params: Value) -> ServiceResult;
    async fn invoke(&self, params: Value) -> ServiceResult;
}

pub struct NoopNodeService;

#[async_trait]
impl NodeService for NoopNodeService {
    async fn list(&self, _params: Value) -> ServiceResult {
        Ok(serde_json::json!([]))
    }

    async fn describe(&self, _params: Value) -> ServiceResult {
        Err("unknown node".into())
    }

    async fn invoke(&self, _params: Value) -> ServiceResult {
        Err("no nodes connected".into())
    }
}

/// Bundles every service trait object the gateway dispatches `method_call`
/// frames to. Constructed once at startup; handed to `methods::dispatch`
/// behind an `Arc`.
pub struct Services {
    pub agent: Box<dyn AgentService>,
    pub chat: Box<dyn ChatService>,
    pub sessions: Box<dyn SessionsService>,
    pub config: Box<dyn ConfigService>,
    pub channels: Box<dyn ChannelsService>,
    pub node: Box<dyn NodeService>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            agent: Box::new(NoopAgentService),
            chat: Box::new(NoopChatService),
            sessions: Box::new(NoopSessionsService),
            config: Box::new(NoopConfigService),
            channels: Box::new(NoopChannelsService),
            node: Box::new(NoopNodeService),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_services_answer_reads_and_reject_writes() {
        let services = Services::default();
        assert!(services.config.get(Value::Null).await.is_ok());
        assert!(services.agent.invoke(Value::Null).await.is_err());
        assert!(services.node.list(Value::Null).await.unwrap().as_array().unwrap().is_empty());
    }
}
