//! Key-exchange driver shared by the stream and datagram channels.
//!
//! A channel performs its handshake lazily, on the first send or receive.
//! The exchange itself is two public-key payloads: with a PSK configured
//! each payload is `HMAC-SHA256(psk, pubkey) ‖ pubkey`, otherwise the raw
//! 32-byte key. Both sides then derive the 16-byte session key with
//! HKDF-SHA256 under the channel-specific info label.

use std::sync::atomic::{AtomicU8, Ordering};

use veil_core::{Error, Result};
use veil_crypto::kex::PUBLIC_KEY_LEN;
use veil_crypto::{kdf, Envelope, EphemeralKeyPair, PresharedKey};

/// Channel role. Fixed once decided: stream channels fix it at
/// construction, datagram channels at their first send or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiated the connection; speaks second in the stream handshake and
    /// first in the datagram handshake.
    Client,
    /// Accepted the connection (or waited for the first packet).
    Server,
}

/// Lifecycle of one secure channel.
///
/// Transitions are monotonic, except that an early close takes the
/// `Init → Closing` shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed; no I/O yet.
    Init,
    /// Key exchange in progress.
    Handshaking,
    /// Session key derived; application traffic allowed.
    Established,
    /// Close in progress.
    Closing,
    /// Channel closed.
    Closed,
}

/// Atomic storage for [`State`], shared across tasks without a lock.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(State::Init as u8))
    }

    pub(crate) fn store(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn load(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            0 => State::Init,
            1 => State::Handshaking,
            2 => State::Established,
            3 => State::Closing,
            _ => State::Closed,
        }
    }
}

/// One side of one key exchange. Consumed when the session key is derived.
pub(crate) struct KeyExchange {
    keypair: EphemeralKeyPair,
    psk: Option<PresharedKey>,
}

impl KeyExchange {
    pub(crate) fn new(psk: Option<PresharedKey>) -> Self {
        Self {
            keypair: EphemeralKeyPair::generate(),
            psk,
        }
    }

    /// The public-key payload this side puts on the wire.
    pub(crate) fn local_payload(&self) -> Result<Vec<u8>> {
        match &self.psk {
            Some(psk) => psk
                .seal_public_key(self.keypair.public_key())
                .map_err(Error::Crypto),
            None => Ok(self.keypair.public_key().to_vec()),
        }
    }

    /// Parse and, when a PSK is configured, verify the peer's payload.
    pub(crate) fn peer_public_key(&self, payload: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN]> {
        match &self.psk {
            Some(psk) => psk.open_public_key(payload).map_err(|e| match e {
                veil_crypto::Error::AuthenticationFailed => Error::HandshakeAuthFailed,
                other => Error::HandshakeFailed(other.to_string()),
            }),
            None => payload.try_into().map_err(|_| {
                Error::HandshakeFailed(format!(
                    "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                    payload.len()
                ))
            }),
        }
    }

    /// Derive the session envelope from the peer's public key.
    pub(crate) fn into_envelope(
        self,
        peer_public: &[u8; PUBLIC_KEY_LEN],
        info: &[u8],
    ) -> Result<Envelope> {
        let shared = self
            .keypair
            .diffie_hellman(peer_public)
            .map_err(|e| Error::HandshakeFailed(e.to_string()))?;
        let key = kdf::derive_session_key(shared.as_ref(), info)
            .map_err(|e| Error::HandshakeFailed(e.to_string()))?;
        Ok(Envelope::new(&key))
    }
}

/// Collapse every non-handshake error raised during the exchange into
/// `HandshakeFailed`, keeping the dedicated timeout/auth kinds intact.
pub(crate) fn as_handshake_error(error: Error) -> Error {
    match error {
        Error::HandshakeTimeout | Error::HandshakeAuthFailed | Error::HandshakeFailed(_) => error,
        other => Error::HandshakeFailed(other.to_string()),
    }
}
