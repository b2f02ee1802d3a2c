//! Channel adapter interface: each messaging platform (Telegram, Discord,
//! Slack, ...) implements [`plugin::ChannelPlugin`] against a narrow
//! [`plugin::GatewayClient`] boundary — ingress builds a turn request and
//! hands it to the gateway, egress receives outbound text to post back.
//!
//! DM access is gated per account via [`gating::DmPolicy`].

pub mod error;
pub mod gating;
pub mod loopback;
pub mod message_log;
pub mod plugin;
pub mod registry;
pub mod store;

pub use {
    error::{Error, Result},
    gating::{DmPolicy, GateDecision, gate},
    loopback::{LoopbackChannelPlugin, LoopbackConfig},
    plugin::{Attachment, ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin, GatewayClient, IngressRequest},
    registry::ChannelRegistry,
    store::{ChannelStore, StoredChannel},
};
