//! Core protocol definitions for the veil secure transport.
//!
//! This crate holds everything the channels agree on without touching a
//! socket:
//! - Error taxonomy shared across the workspace
//! - Length-prefixed framing (4-byte big-endian headers)
//! - Message payload codecs: strings, bytes, 32-bit integers, and the
//!   in-band end-of-stream sentinels
//! - Per-instance configuration
//!
//! Platform I/O lives in veil-net; cryptography lives in veil-crypto.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod frame;
pub mod message;

pub use config::{ChannelConfig, DatagramConfig, ListenerConfig};
pub use error::{Error, Result};
