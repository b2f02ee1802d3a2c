//! Scheduled session wakeups: on a schedule, inject a message into a
//! session as if it had just arrived over a channel.
//!
//! Jobs persist through a [`store::CronStore`] (JSON file or in-memory for
//! tests); [`service::CronService`] is the timer loop that fires them.

pub mod error;
pub mod parse;
pub mod schedule;
pub mod service;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod types;

pub use error::{Error, Result};
