//! Per-connection lifecycle: handshake (`hello` / `challenge` / `proof`),
//! then a `method_call` / `response` / `event` loop until the socket closes.

use std::{sync::Arc, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use base64::{Engine, engine::general_purpose::STANDARD as b64};
use futures::{SinkExt, StreamExt};
use rand::RngCore;
use relaykit_auth::{PairingRole, verify_signature};
use relaykit_protocol::{
    ChallengeFrame, ErrorFrame, ErrorShape, GatewayFrame, HANDSHAKE_TIMEOUT_MS, MAX_PAYLOAD_BYTES, PROTOCOL_VERSION,
    Policy, ServerInfo, SessionEstablished, TICK_INTERVAL_MS, error_codes, roles, scopes,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    methods,
    state::{ConnectedClient, GatewayState},
};

fn owner_scopes() -> Vec<String> {
    vec![scopes::ADMIN.into()]
}

fn scopes_for_pairing_role(role: PairingRole) -> Vec<String> {
    match role {
        PairingRole::Operator => vec![scopes::ADMIN.into()],
        PairingRole::Node => vec![scopes::READ.into(), scopes::WRITE.into()],
        PairingRole::Channel => vec![scopes::READ.into(), scopes::WRITE.into()],
        PairingRole::ReadOnly => vec![scopes::READ.into()],
    }
}

async fn send_frame(tx: &mpsc::UnboundedSender<String>, frame: &GatewayFrame) {
    if let Ok(json) = serde_json::to_string(frame) {
        let _ = tx.send(json);
    }
}

/// Read frames from the socket until the handshake completes or fails.
/// Returns the resolved `(role, scopes)` on success.
async fn run_handshake(
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
    tx: &mpsc::UnboundedSender<String>,
    state: &GatewayState,
    conn_id: &str,
) -> Result<(String, Vec<String>), ErrorShape> {
    let hello = next_frame(ws_rx).await.ok_or_else(|| ErrorShape::new(error_codes::HANDSHAKE_TIMEOUT, "no hello frame"))?;

    let hello = match hello {
        GatewayFrame::Hello(h) => h,
        _ => return Err(ErrorShape::new(error_codes::BAD_SIGNATURE, "expected hello frame first")),
    };

    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let nonce_b64 = b64.encode(nonce);

    send_frame(
        tx,
        &GatewayFrame::Challenge(ChallengeFrame {
            nonce: nonce_b64.clone(),
            conn_id: conn_id.to_string(),
        }),
    )
    .await;

    let proof = next_frame(ws_rx).await.ok_or_else(|| ErrorShape::new(error_codes::HANDSHAKE_TIMEOUT, "no proof frame"))?;
    let proof = match proof {
        GatewayFrame::Proof(p) => p,
        _ => return Err(ErrorShape::new(error_codes::BAD_SIGNATURE, "expected proof frame")),
    };

    if let Some(public_key) = hello.public_key.as_deref() {
        let signature = proof.signature.as_deref().ok_or_else(|| ErrorShape::new(error_codes::BAD_SIGNATURE, "missing signature"))?;
        verify_signature(public_key, nonce.as_slice(), signature)
            .map_err(|_| ErrorShape::new(error_codes::BAD_SIGNATURE, "signature verification failed"))?;

        let is_owner = public_key == state.identity.public().public_key;
        let scopes = if is_owner { owner_scopes() } else { vec![scopes::READ.into()] };
        return Ok((hello.role, scopes));
    }

    let token = hello
        .token
        .as_deref()
        .or(proof.token.as_deref())
        .ok_or_else(|| ErrorShape::new(error_codes::UNKNOWN_DEVICE, "neither publicKey nor token supplied"))?;

    let role = state
        .pairing
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .consume(token)
        .map_err(|e| ErrorShape::new(error_codes::UNKNOWN_DEVICE, e.to_string()))?;

    Ok((hello.role, scopes_for_pairing_role(role)))
}

async fn next_frame(ws_rx: &mut futures::stream::SplitStream<WebSocket>) -> Option<GatewayFrame> {
    loop {
        match ws_rx.next().await? {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_PAYLOAD_BYTES {
                    return None;
                }
                return serde_json::from_str(&text).ok();
            },
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue, // ping/pong/binary: ignore pre-handshake
        }
    }
}

/// Drive one WebSocket connection through handshake and the RPC loop.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let handshake = tokio::time::timeout(Duration::from_millis(HANDSHAKE_TIMEOUT_MS), run_handshake(&mut ws_rx, &tx, &state, &conn_id)).await;

    let (role, scopes) = match handshake {
        Ok(Ok(resolved)) => resolved,
        Ok(Err(err)) => {
            send_frame(&tx, &GatewayFrame::Error(ErrorFrame { error: err })).await;
            drop(tx);
            write_handle.abort();
            return;
        },
        Err(_) => {
            send_frame(
                &tx,
                &GatewayFrame::Error(ErrorFrame {
                    error: ErrorShape::new(error_codes::HANDSHAKE_TIMEOUT, "handshake timed out"),
                }),
            )
            .await;
            drop(tx);
            write_handle.abort();
            return;
        },
    };

    info!(conn_id = %conn_id, role = %role, "gateway: connection established");

    send_frame(
        &tx,
        &GatewayFrame::SessionEstablished(SessionEstablished {
            protocol: PROTOCOL_VERSION,
            server: ServerInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                conn_id: conn_id.clone(),
                hostname: state.hostname.clone(),
            },
            policy: Policy::default_policy(),
            role: role.clone(),
            scopes: scopes.clone(),
        }),
    )
    .await;

    state.connections.insert(
        conn_id.clone(),
        ConnectedClient {
            role: role.clone(),
            scopes,
            sender: tx,
        },
    );

    let mut tick = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    tick.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_PAYLOAD_BYTES {
                            if let Some(client) = state.connections.get(&conn_id) {
                                client.send(&serde_json::to_string(&GatewayFrame::Error(ErrorFrame {
                                    error: ErrorShape::new(error_codes::PAYLOAD_TOO_LARGE, "frame exceeds max payload"),
                                })).unwrap_or_default());
                            }
                            continue;
                        }
                        let Ok(parsed) = serde_json::from_str::<GatewayFrame>(&text) else {
                            continue;
                        };
                        let GatewayFrame::MethodCall(call) = parsed else {
                            continue; // post-handshake, only method_call is valid from the client
                        };
                        if let Some(client) = state.connections.get(&conn_id) {
                            let response = methods::dispatch(&call, &client, &state.services).await;
                            client.send(&serde_json::to_string(&GatewayFrame::Response(response)).unwrap_or_default());
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        debug!(conn_id = %conn_id, error = %err, "gateway: read error");
                        break;
                    },
                    _ => {},
                }
            },
            _ = tick.tick() => {
                crate::broadcast::broadcast(&state, "ops", "tick", serde_json::json!({"connId": conn_id}));
            },
        }
    }

    state.connections.remove(&conn_id);
    write_handle.abort();
    info!(conn_id = %conn_id, "gateway: connection closed");
}
