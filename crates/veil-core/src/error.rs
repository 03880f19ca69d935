//! Error types for protocol operations.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Protocol operation errors.
///
/// Fatal errors mark the channel broken or closed; later calls observe
/// that state and fail without touching the socket again.
#[derive(Debug, Error)]
pub enum Error {
    /// Server-side handshake window elapsed before the peer completed the
    /// key exchange. Fatal for the channel.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// PSK authentication of the peer's public key failed. Fatal.
    #[error("Handshake authentication failed")]
    HandshakeAuthFailed,

    /// Any other handshake failure: malformed key, short read, crypto
    /// error. Fatal.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Tag mismatch on an established channel: the message was tampered
    /// with or corrupted. Fatal.
    #[error("Authentication failed: message tampered or corrupted")]
    AuthenticationFailed,

    /// Frame body ended before the length its header announced. Fatal.
    #[error("Truncated frame")]
    Truncated,

    /// Frame header announced a length above the configured maximum. The
    /// body is rejected before any allocation. Fatal.
    #[error("Frame of {len} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge {
        /// Length announced by the header.
        len: u64,
        /// Configured maximum frame size.
        max: u32,
    },

    /// Peer closed the connection cleanly between frames. Non-fatal
    /// termination; the channel closes.
    #[error("Peer closed the connection")]
    PeerClosed,

    /// OS-level pipe break, reset or abort. Subsequent operations on the
    /// channel are no-ops returning this same error.
    #[error("Connection broken")]
    ConnectionBroken,

    /// Read timeout before any byte of the next frame arrived. Recoverable:
    /// the caller may retry the receive.
    #[error("Receive timed out")]
    Timeout,

    /// Operation on a closed channel.
    #[error("Channel is closed")]
    Closed,

    /// Datagram send without a target before any peer address was learned.
    #[error("No peer address known")]
    NoPeer,

    /// Datagram plaintext above what one UDP packet can carry.
    #[error("Payload of {len} bytes exceeds the datagram limit of {max} bytes")]
    PayloadTooLarge {
        /// Plaintext length requested.
        len: usize,
        /// Largest plaintext one packet can carry.
        max: usize,
    },

    /// Decrypted payload does not decode as the requested message type.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] veil_crypto::Error),

    /// I/O error (not a protocol error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
