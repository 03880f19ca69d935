//! Best-effort encrypted packet channel over UDP.
//!
//! Each UDP payload is exactly one envelope; the datagram boundary is the
//! frame, so there is no length prefix. Packet loss and reordering are the
//! caller's problem: no acks, no retries.
//!
//! The handshake is triggered by the first send or receive. A send with a
//! target makes this side the client; a receive makes it the server and
//! learns the peer's address from the first packet, so later sends may
//! omit the target. Unlike the stream channel there is no broken flag: a
//! packet that fails authentication is reported and dropped, and the
//! channel stays usable, since any off-path sender could otherwise shut it
//! down with one forged packet.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex as SyncMutex;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use veil_core::{message, DatagramConfig, Error, Result};
use veil_crypto::envelope::{KEY_LEN, OVERHEAD};
use veil_crypto::{kdf, Envelope};

use crate::handshake::{as_handshake_error, KeyExchange, Role, State, StateCell};

/// Encrypted datagram channel bound to one UDP socket.
pub struct SecureDatagram {
    socket: UdpSocket,
    handshake: Mutex<()>,
    envelope: OnceLock<Envelope>,
    role: OnceLock<Role>,
    state: StateCell,
    closed: AtomicBool,
    peer: SyncMutex<Option<SocketAddr>>,
    config: DatagramConfig,
}

impl SecureDatagram {
    /// Bind a UDP socket. The handshake runs on the first send or receive.
    pub async fn bind(addr: SocketAddr, config: DatagramConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            handshake: Mutex::new(()),
            envelope: OnceLock::new(),
            role: OnceLock::new(),
            state: StateCell::new(),
            closed: AtomicBool::new(false),
            peer: SyncMutex::new(None),
            config,
        })
    }

    /// Bind with a pre-established 16-byte session key, skipping the
    /// handshake entirely. Both peers must be constructed this way with
    /// the same key.
    pub async fn bind_with_session_key(
        addr: SocketAddr,
        key: &[u8; KEY_LEN],
        config: DatagramConfig,
    ) -> Result<Self> {
        let channel = Self::bind(addr, config).await?;
        channel.envelope.get_or_init(|| Envelope::new(key));
        channel.state.store(State::Established);
        Ok(channel)
    }

    // === Send operations ===

    /// Send a string message (or the end-of-stream sentinel for `None`) to
    /// an explicit target.
    pub async fn send_str_to(&self, message: Option<&str>, target: SocketAddr) -> Result<usize> {
        self.send_plain(&message::encode_str(message), Some(target))
            .await
    }

    /// Send a string message to the learned peer.
    pub async fn send_str(&self, message: Option<&str>) -> Result<usize> {
        self.send_plain(&message::encode_str(message), None).await
    }

    /// Send a byte message (or the end-of-stream sentinel for `None`) to
    /// an explicit target.
    pub async fn send_bytes_to(&self, message: Option<&[u8]>, target: SocketAddr) -> Result<usize> {
        self.send_plain(&message::encode_bytes(message), Some(target))
            .await
    }

    /// Send a byte message to the learned peer.
    pub async fn send_bytes(&self, message: Option<&[u8]>) -> Result<usize> {
        self.send_plain(&message::encode_bytes(message), None).await
    }

    // === Receive operations ===

    /// Receive one string message; the end-of-stream sentinel surfaces as
    /// `None`.
    pub async fn receive_str(&self) -> Result<Option<String>> {
        message::decode_str(self.receive_plain().await?)
    }

    /// Receive one byte message; the end-of-stream sentinel surfaces as
    /// `None`.
    pub async fn receive_bytes(&self) -> Result<Option<Vec<u8>>> {
        Ok(message::decode_bytes(self.receive_plain().await?))
    }

    // === Lifecycle ===

    /// Close the channel. Idempotent; the socket is released when the
    /// channel is dropped.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.state.store(State::Closed);
        Ok(())
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether a session key is in place.
    pub fn is_established(&self) -> bool {
        self.envelope.get().is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state.load()
    }

    /// This side's role, once the first send or receive has decided it.
    /// Channels built from a preset session key never take a role.
    pub fn role(&self) -> Option<Role> {
        self.role.get().copied()
    }

    /// The learned peer address, if any packet has been observed (or a
    /// client handshake has fixed it).
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.peer.lock()
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Largest plaintext one packet can carry under this configuration.
    pub fn max_plaintext(&self) -> usize {
        self.config.max_udp_payload.saturating_sub(OVERHEAD)
    }

    // === Internals ===

    async fn send_plain(&self, plain: &[u8], target: Option<SocketAddr>) -> Result<usize> {
        let resolved = match target {
            Some(target) => target,
            None => self.peer_addr().ok_or(Error::NoPeer)?,
        };

        let envelope = self.ensure_established(Some(resolved)).await?;

        let max_plain = self.max_plaintext();
        if plain.len() > max_plain {
            return Err(Error::PayloadTooLarge {
                len: plain.len(),
                max: max_plain,
            });
        }

        let sealed = envelope.seal(plain).map_err(Error::Crypto)?;
        self.send_packet(&sealed, resolved).await
    }

    async fn receive_plain(&self) -> Result<Vec<u8>> {
        let envelope = self.ensure_established(None).await?;
        let (packet, from) = self.recv_packet().await?;
        *self.peer.lock() = Some(from);

        match envelope.open(&packet) {
            Ok(plain) => Ok(plain),
            Err(veil_crypto::Error::AuthenticationFailed) => {
                warn!(from = %from, "dropping packet that failed authentication");
                Err(Error::AuthenticationFailed)
            }
            Err(e) => Err(Error::Crypto(e)),
        }
    }

    async fn send_packet(&self, payload: &[u8], target: SocketAddr) -> Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if payload.len() > self.config.max_udp_payload {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: self.config.max_udp_payload,
            });
        }
        Ok(self.socket.send_to(payload, target).await?)
    }

    async fn recv_packet(&self) -> Result<(Vec<u8>, SocketAddr)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let mut buf = vec![0u8; self.config.max_udp_payload];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }

    /// Fast path once established; otherwise run the handshake under its
    /// mutex. The first I/O decides the role: a send (which always has a
    /// resolved target) initiates as client, a receive waits as server.
    async fn ensure_established(&self, target: Option<SocketAddr>) -> Result<&Envelope> {
        if let Some(envelope) = self.envelope.get() {
            return Ok(envelope);
        }

        let _guard = self.handshake.lock().await;
        if let Some(envelope) = self.envelope.get() {
            return Ok(envelope);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let role = *self.role.get_or_init(|| match target {
            Some(_) => Role::Client,
            None => Role::Server,
        });
        self.state.store(State::Handshaking);

        let outcome = match (role, target) {
            (Role::Client, Some(target)) => self.client_handshake(target).await,
            (Role::Client, None) => Err(Error::NoPeer),
            (Role::Server, _) => self.server_handshake().await,
        };

        match outcome {
            Ok(envelope) => {
                let envelope = self.envelope.get_or_init(|| envelope);
                self.state.store(State::Established);
                debug!(role = ?role, peer = ?self.peer_addr(), "handshake complete");
                Ok(envelope)
            }
            Err(e) => {
                let e = as_handshake_error(e);
                warn!(role = ?role, error = %e, "handshake failed");
                let _ = self.close();
                Err(e)
            }
        }
    }

    /// Client side: our key payload goes out first; the server's answer
    /// fixes the peer address.
    async fn client_handshake(&self, target: SocketAddr) -> Result<Envelope> {
        let exchange = KeyExchange::new(self.config.psk.clone());
        *self.peer.lock() = Some(target);
        self.send_packet(&exchange.local_payload()?, target).await?;

        let (response, from) = self.recv_packet().await?;
        *self.peer.lock() = Some(from);

        let peer_public = exchange.peer_public_key(&response)?;
        exchange.into_envelope(&peer_public, kdf::DATAGRAM_INFO)
    }

    /// Server side: the first packet carries the client's key payload and
    /// teaches us the peer address.
    async fn server_handshake(&self) -> Result<Envelope> {
        let exchange = KeyExchange::new(self.config.psk.clone());
        let (request, from) = self.recv_packet().await?;
        *self.peer.lock() = Some(from);

        let peer_public = exchange.peer_public_key(&request)?;
        self.send_packet(&exchange.local_payload()?, from).await?;

        exchange.into_envelope(&peer_public, kdf::DATAGRAM_INFO)
    }
}
