//! The control plane: a WebSocket server that authenticates connections
//! (device signature or pairing token), dispatches `method_call` frames to
//! the [`relaykit_service_traits::Services`] bundle, and fans out events to
//! subscribed clients.
//!
//! Binds loopback by default; a non-loopback bind without TLS is refused
//! at startup rather than silently serving plaintext off the local host.

pub mod broadcast;
pub mod error;
pub mod methods;
pub mod server;
pub mod state;
pub mod ws;

pub use error::{Error, Result};
pub use state::GatewayState;
