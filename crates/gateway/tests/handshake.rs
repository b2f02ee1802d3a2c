//! End-to-end: a real WebSocket client completes the hello/challenge/proof
//! handshake against a live gateway listener and issues an RPC call.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as b64};
use relaykit_auth::{DeviceIdentity, PairingRole};
use relaykit_gateway::{GatewayState, server};
use relaykit_protocol::{GatewayFrame, HelloFrame, MethodCallFrame, ProofFrame, scopes};
use relaykit_service_traits::Services;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_gateway(state: Arc<GatewayState>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn send(ws: &mut Client, frame: &GatewayFrame) {
    let json = serde_json::to_string(frame).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

async fn recv(ws: &mut Client) -> GatewayFrame {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn pairing_token_handshake_then_rpc_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let identity = DeviceIdentity::load_or_create(dir.path()).unwrap();
    let state = Arc::new(GatewayState::new(identity, Services::default()));
    let token = state.pairing.lock().unwrap().issue(PairingRole::Operator, 60);

    let addr = spawn_gateway(state).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    send(
        &mut ws,
        &GatewayFrame::Hello(HelloFrame {
            role: "operator".into(),
            public_key: None,
            token: Some(token.clone()),
        }),
    )
    .await;
    assert!(matches!(recv(&mut ws).await, GatewayFrame::Challenge(_)));

    send(
        &mut ws,
        &GatewayFrame::Proof(ProofFrame {
            signature: None,
            token: Some(token),
        }),
    )
    .await;

    let GatewayFrame::SessionEstablished(established) = recv(&mut ws).await else {
        panic!("expected session_established");
    };
    assert_eq!(established.role, "operator");
    assert!(established.scopes.contains(&scopes::ADMIN.to_string()));

    send(
        &mut ws,
        &GatewayFrame::MethodCall(MethodCallFrame {
            id: "call-1".into(),
            method: "config.get".into(),
            params: None,
        }),
    )
    .await;

    let GatewayFrame::Response(response) = recv(&mut ws).await else {
        panic!("expected response");
    };
    assert_eq!(response.id, "call-1");
    assert!(response.ok);
}

#[tokio::test]
async fn device_signature_handshake_grants_owner_admin_scope() {
    let dir = tempfile::tempdir().unwrap();
    let owner = DeviceIdentity::load_or_create(dir.path()).unwrap();
    let public = owner.public();
    let state = Arc::new(GatewayState::new(DeviceIdentity::load_or_create(dir.path()).unwrap(), Services::default()));

    let addr = spawn_gateway(state).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    send(
        &mut ws,
        &GatewayFrame::Hello(HelloFrame {
            role: "operator".into(),
            public_key: Some(public.public_key.clone()),
            token: None,
        }),
    )
    .await;
    let GatewayFrame::Challenge(challenge) = recv(&mut ws).await else {
        panic!("expected challenge");
    };
    let nonce = b64.decode(challenge.nonce).unwrap();
    let signature = owner.sign(&nonce);

    send(
        &mut ws,
        &GatewayFrame::Proof(ProofFrame {
            signature: Some(signature),
            token: None,
        }),
    )
    .await;

    let GatewayFrame::SessionEstablished(established) = recv(&mut ws).await else {
        panic!("expected session_established");
    };
    assert!(established.scopes.contains(&scopes::ADMIN.to_string()));
}
