//! Fan out server-push events to every connection whose scopes admit them.
//!
//! Events are never persisted or replayed: a reconnecting client only ever
//! sees events published after it (re)joins.

use relaykit_protocol::{EventFrame, GatewayFrame, scopes};

use crate::state::GatewayState;

/// Scope required to receive an event on a given topic, if any. Absent
/// entries are open to every connected client (chat/session events).
fn required_scope(topic: &str) -> Option<&'static str> {
    match topic {
        "ops" => Some(scopes::READ),
        "pairing" => Some(scopes::PAIRING),
        _ => None,
    }
}

/// Publish an event to every eligible connection. Slow or dead consumers
/// are not retried here — the write loop owning that channel will notice
/// the closed receiver and tear the connection down.
pub fn broadcast(state: &GatewayState, topic: &str, event: &str, payload: serde_json::Value) {
    let frame = GatewayFrame::Event(EventFrame::new(topic, event, payload, state.next_seq()));
    let json = match serde_json::to_string(&frame) {
        Ok(j) => j,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize broadcast event");
            return;
        },
    };

    let guard = required_scope(topic);
    for entry in &state.connections {
        if let Some(scope) = guard
            && !entry.value().has_scope(scope)
        {
            continue;
        }
        let _ = entry.value().send(&json);
    }
}
