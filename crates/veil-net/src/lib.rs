//! Secure channels over TCP and UDP for the veil transport.
//!
//! Two channel types share one envelope format:
//! - [`SecureStream`]: reliable, ordered, bidirectional encrypted messages
//!   over a connected TCP stream, with lazy handshake and per-direction
//!   serialization.
//! - [`SecureDatagram`]: best-effort encrypted packets over UDP with
//!   peer-address auto-learning.
//!
//! [`SecureListener`] accepts raw connections, applies socket options, an
//! IP deny-set and the zombie-defense handshake window, and hands each
//! accepted endpoint to a task-per-connection consumer without doing any
//! cryptographic work in the accept loop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod datagram;
pub mod handshake;
pub mod listener;
pub mod stream;

pub use datagram::SecureDatagram;
pub use handshake::{Role, State};
pub use listener::SecureListener;
pub use stream::SecureStream;
pub use veil_core::{config, ChannelConfig, DatagramConfig, Error, ListenerConfig, Result};
pub use veil_crypto::PresharedKey;
