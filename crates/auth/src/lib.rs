//! Device identity and pairing for the gateway's handshake.
//!
//! This crate provides:
//! - `identity`: the long-lived Ed25519 device keypair and handshake signing
//! - `pairing`: single-use, role-scoped pairing tokens
//! - Connection locality detection for the non-loopback TLS requirement

pub mod error;
pub mod identity;
pub mod locality;
pub mod pairing;

pub use error::{Context, Error, Result};
pub use identity::{DeviceIdentity, DevicePublicIdentity, default_identity_dir, verify_signature};
pub use locality::{has_proxy_headers, is_local_connection};
pub use pairing::{PairingRole, PairingStore};
