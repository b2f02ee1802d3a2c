//! In-process loopback adapter: a concrete, minimal [`ChannelPlugin`] that
//! never touches the network. Proves the adapter interface is implementable
//! end-to-end and gives integration tests a channel to drive without a real
//! messaging platform behind it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    Result,
    gating::{DmPolicy, GateDecision, gate},
    plugin::{ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin, GatewayClient, IngressRequest},
};

/// Config accepted by [`LoopbackChannelPlugin::startup`].
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopbackConfig {
    #[serde(default)]
    pub dm_policy: DmPolicy,
    #[serde(default)]
    pub allowlist: Vec<String>,
}

struct Account {
    gateway: Arc<dyn GatewayClient>,
    config: LoopbackConfig,
}

/// An in-process channel: `deliver` plays the role of an inbound wire
/// message, `sent` records every outbound reply so tests can assert on it.
#[derive(Default)]
pub struct LoopbackChannelPlugin {
    account: Mutex<Option<Account>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl LoopbackChannelPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(to, text)` pair handed to [`ChannelOutbound::send_text`] so far.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Simulate an inbound message from `sender_id`. Applies DM gating before
    /// handing the request to the gateway; returns the gating decision so
    /// tests can assert on both paths without inspecting internal state.
    pub async fn deliver(&self, sender_id: &str, session_key: &str, body: &str) -> Result<GateDecision> {
        let guard = self.account.lock().unwrap_or_else(|e| e.into_inner());
        let Some(account) = guard.as_ref() else {
            return Err(crate::Error::unavailable("loopback channel not started"));
        };

        let decision = gate(sender_id, account.config.dm_policy, &account.config.allowlist);
        if decision != GateDecision::Allow {
            tracing::debug!(sender_id, ?decision, "loopback channel: inbound message gated");
            return Ok(decision);
        }

        let gateway = Arc::clone(&account.gateway);
        drop(guard);

        gateway
            .ingress(IngressRequest {
                session_key: session_key.to_string(),
                body: body.to_string(),
                attachments: vec![],
                sender_id: sender_id.to_string(),
            })
            .await?;
        Ok(decision)
    }
}

#[async_trait]
impl ChannelPlugin for LoopbackChannelPlugin {
    fn id(&self) -> &str {
        "loopback"
    }

    async fn startup(&mut self, _account_id: &str, config: serde_json::Value, gateway: Arc<dyn GatewayClient>) -> Result<()> {
        let config: LoopbackConfig = if config.is_null() {
            LoopbackConfig {
                dm_policy: DmPolicy::default(),
                allowlist: vec![],
            }
        } else {
            serde_json::from_value(config)?
        };
        *self.account.lock().unwrap_or_else(|e| e.into_inner()) = Some(Account { gateway, config });
        Ok(())
    }

    async fn shutdown(&mut self, _account_id: &str) -> Result<()> {
        *self.account.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(self)
    }

    async fn health_report(&self, account_id: &str) -> Result<ChannelHealthSnapshot> {
        let connected = self.account.lock().unwrap_or_else(|e| e.into_inner()).is_some();
        Ok(ChannelHealthSnapshot {
            connected,
            account_id: account_id.to_string(),
            details: None,
        })
    }
}

#[async_trait]
impl ChannelOutbound for LoopbackChannelPlugin {
    async fn send_text(&self, _account_id: &str, to: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to.to_string(), text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    struct RecordingGateway {
        ingressed: StdMutex<Vec<IngressRequest>>,
    }

    #[async_trait]
    impl GatewayClient for RecordingGateway {
        async fn ingress(&self, request: IngressRequest) -> Result<()> {
            self.ingressed.lock().unwrap().push(request);
            Ok(())
        }

        async fn send_outbound(&self, _session_key: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn startup_then_allowed_sender_reaches_gateway_ingress() {
        let gateway = Arc::new(RecordingGateway {
            ingressed: StdMutex::new(vec![]),
        });
        let mut plugin = LoopbackChannelPlugin::new();
        plugin
            .startup(
                "acct-1",
                serde_json::json!({"dmPolicy": "open", "allowlist": ["*"]}),
                gateway.clone(),
            )
            .await
            .unwrap();

        let decision = plugin.deliver("peer-1", "loopback:peer-1", "hello").await.unwrap();
        assert_eq!(decision, GateDecision::Allow);
        assert_eq!(gateway.ingressed.lock().unwrap().len(), 1);
        assert_eq!(gateway.ingressed.lock().unwrap()[0].body, "hello");
    }

    #[tokio::test]
    async fn unknown_sender_under_default_pairing_policy_is_challenged_not_ingressed() {
        let gateway = Arc::new(RecordingGateway {
            ingressed: StdMutex::new(vec![]),
        });
        let mut plugin = LoopbackChannelPlugin::new();
        plugin.startup("acct-1", serde_json::Value::Null, gateway.clone()).await.unwrap();

        let decision = plugin.deliver("stranger", "loopback:stranger", "hi").await.unwrap();
        assert_eq!(decision, GateDecision::ChallengePairing);
        assert!(gateway.ingressed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn outbound_replies_are_recorded_and_health_reports_connected() {
        let gateway = Arc::new(RecordingGateway {
            ingressed: StdMutex::new(vec![]),
        });
        let mut plugin = LoopbackChannelPlugin::new();
        plugin
            .startup("acct-1", serde_json::json!({"dmPolicy": "open", "allowlist": ["*"]}), gateway)
            .await
            .unwrap();

        let health = plugin.health_report("acct-1").await.unwrap();
        assert!(health.connected);

        plugin.outbound().unwrap().send_text("acct-1", "peer-1", "hi there").await.unwrap();
        assert_eq!(plugin.sent_messages(), vec![("peer-1".to_string(), "hi there".to_string())]);
    }

    #[tokio::test]
    async fn shutdown_marks_health_disconnected_and_deliver_fails() {
        let gateway = Arc::new(RecordingGateway {
            ingressed: StdMutex::new(vec![]),
        });
        let mut plugin = LoopbackChannelPlugin::new();
        plugin
            .startup("acct-1", serde_json::json!({"dmPolicy": "open", "allowlist": ["*"]}), gateway)
            .await
            .unwrap();
        plugin.shutdown("acct-1").await.unwrap();

        let health = plugin.health_report("acct-1").await.unwrap();
        assert!(!health.connected);
        assert!(plugin.deliver("peer-1", "loopback:peer-1", "hi").await.is_err());
    }
}
