//! Shared gateway state: connected clients, the device identity used in the
//! handshake, outstanding pairing tokens, and the [`Services`] bundle every
//! RPC method is dispatched against.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use relaykit_auth::{DeviceIdentity, PairingStore};
use relaykit_service_traits::Services;
use tokio::sync::mpsc;

/// A connection that has completed the handshake.
pub struct ConnectedClient {
    pub role: String,
    pub scopes: Vec<String>,
    pub sender: mpsc::UnboundedSender<String>,
}

impl ConnectedClient {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == relaykit_protocol::scopes::ADMIN || s == scope)
    }

    /// Best-effort send; a full or closed channel is treated as a dead
    /// connection rather than an error (the write loop will notice).
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

pub struct GatewayState {
    pub identity: DeviceIdentity,
    pub pairing: std::sync::Mutex<PairingStore>,
    pub services: Services,
    pub connections: DashMap<String, ConnectedClient>,
    pub hostname: String,
    event_seq: AtomicU64,
}

impl GatewayState {
    pub fn new(identity: DeviceIdentity, services: Services) -> Self {
        Self {
            identity,
            pairing: std::sync::Mutex::new(PairingStore::new()),
            services,
            connections: DashMap::new(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".into()),
            event_seq: AtomicU64::new(0),
        }
    }

    /// Next monotonically increasing sequence number for an [`EventFrame`].
    pub fn next_seq(&self) -> u64 {
        self.event_seq.fetch_add(1, Ordering::Relaxed)
    }
}

pub type SharedState = Arc<GatewayState>;
