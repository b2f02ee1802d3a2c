//! HTTP/WebSocket listener: binds the gateway's socket, refusing a
//! non-loopback bind without TLS, and serves `/healthz` plus the `/ws`
//! upgrade route.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{Router, extract::State, extract::WebSocketUpgrade, response::IntoResponse, routing::get};
use tracing::info;

use crate::{
    error::{Error, Result},
    state::GatewayState,
    ws::handle_connection,
};

fn is_loopback(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

/// TLS material for a non-loopback bind. Loaded from operator-supplied
/// certificate/key files; the gateway never generates its own certificate
/// for anything but loopback-only local testing.
pub struct TlsConfig {
    pub cert_path: std::path::PathBuf,
    pub key_path: std::path::PathBuf,
}

/// The gateway's routes, exposed so embedders can compose it with other
/// HTTP surfaces rather than always owning the whole listener.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "ok"}))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Bind and serve. A non-loopback `addr` without `tls` is a startup error
/// per the external-interface contract: the gateway must refuse to listen
/// unencrypted outside the local machine.
pub async fn serve(addr: SocketAddr, tls: Option<TlsConfig>, state: Arc<GatewayState>) -> Result<()> {
    let app = router(state);

    if is_loopback(&addr) {
        info!(%addr, "gateway: binding loopback, no TLS required");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        return Ok(());
    }

    let Some(tls) = tls else {
        return Err(Error::NonLoopbackRequiresTls { addr: addr.to_string() });
    };

    info!(%addr, cert = %tls.cert_path.display(), "gateway: binding non-loopback with TLS");
    let rustls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(Error::Io)?;
    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
