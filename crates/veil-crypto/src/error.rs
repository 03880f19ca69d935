//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type alias for cryptographic operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Key exchange failed.
    #[error("Key exchange failed: {0}")]
    KeyExchange(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// AEAD encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Envelope too short to carry a nonce and an authentication tag.
    #[error("Malformed envelope: {len} bytes")]
    MalformedEnvelope {
        /// Length of the rejected input in bytes.
        len: usize,
    },

    /// Tag verification failed: the data was tampered with, or the peer
    /// holds a different key.
    #[error("Authentication failed")]
    AuthenticationFailed,
}
