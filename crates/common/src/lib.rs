//! Shared types, error definitions, and utilities used across all relaykit crates.

pub mod error;
pub mod hooks;
pub mod types;

pub use error::{Error, FromMessage, RelaykitError, Result};
