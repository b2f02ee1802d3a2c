use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// What an ingress adapter hands the gateway for a single inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRequest {
    pub session_key: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub sender_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: String,
    pub url: String,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// The channel side of the gateway boundary: start a turn and post a reply.
/// Implemented by the gateway; channel plugins only see this narrow trait so
/// they cannot reach into agent/session internals.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Admit an inbound message, routing it to `agent.invoke` once gating passes.
    async fn ingress(&self, request: IngressRequest) -> Result<()>;

    /// Deliver an outbound reply (from `chat.delta`/`chat.message_end`) to the peer.
    async fn send_outbound(&self, session_key: &str, text: &str) -> Result<()>;
}

/// Health snapshot a channel reports back to the gateway on its heartbeat.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelHealthSnapshot {
    pub connected: bool,
    pub account_id: String,
    pub details: Option<String>,
}

/// Each messaging platform (Telegram, Discord, Slack, ...) implements this.
/// `startup`/`shutdown` bound the account's lifecycle; the plugin drives its
/// own ingress loop internally, calling back into `GatewayClient::ingress`
/// for each admitted message and `GatewayClient::send_outbound` is called by
/// the gateway once a turn produces output — the plugin only needs to accept
/// `send_outbound`-shaped calls through its own egress handle, exposed via
/// [`ChannelOutbound`].
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    fn id(&self) -> &str;

    async fn startup(&mut self, account_id: &str, config: serde_json::Value, gateway: Arc<dyn GatewayClient>) -> Result<()>;

    async fn shutdown(&mut self, account_id: &str) -> Result<()>;

    fn outbound(&self) -> Option<&dyn ChannelOutbound>;

    async fn health_report(&self, account_id: &str) -> Result<ChannelHealthSnapshot>;
}

/// Deliver a reply to a specific peer on this channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(&self, account_id: &str, to: &str, text: &str) -> Result<()>;
}
