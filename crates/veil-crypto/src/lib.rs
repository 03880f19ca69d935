//! Cryptographic primitives for the veil secure transport.
//!
//! This crate implements the cryptographic foundations of the protocol:
//! - Key exchange: ephemeral X25519 (RFC 7748)
//! - Key derivation: HKDF-SHA256 (RFC 5869), 16-byte session keys
//! - Handshake authentication: HMAC-SHA256 over public keys with a PSK
//! - Message protection: AES-128-GCM envelopes (12-byte nonce, 128-bit tag)
//!
//! Security requirements:
//! - No unsafe code
//! - Private scalars, shared secrets, session keys and PSK bytes use
//!   `Zeroizing` wrappers so they are cleared from memory on drop
//! - Constant-time MAC verification
//! - No logging of key material

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod error;
pub mod kdf;
pub mod kex;
pub mod psk;

pub use envelope::Envelope;
pub use error::{Error, Result};
pub use kex::EphemeralKeyPair;
pub use psk::PresharedKey;
