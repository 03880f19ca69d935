//! Reliable, ordered, encrypted message channel over TCP.
//!
//! A [`SecureStream`] wraps one connected TCP stream 1:1. The handshake is
//! lazy: whichever send or receive happens first drives the key exchange,
//! serialized by a dedicated mutex, so accepting a connection stays cheap
//! and a listener can hand channels out without doing cryptographic work.
//!
//! Concurrency discipline: one mutex per direction, held for exactly one
//! frame, plus the one-time handshake mutex. All of them are async-aware,
//! so a suspended read or write never pins a runtime worker. Frames from
//! concurrent senders never interleave; concurrent receivers obtain
//! distinct whole frames.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use veil_core::{frame, message, ChannelConfig, Error, Result};
use veil_crypto::{kdf, Envelope};

use crate::handshake::{as_handshake_error, KeyExchange, Role, State, StateCell};

/// Encrypted, length-framed message channel over a connected TCP stream.
///
/// All messages travel as `[len: u32 BE][nonce ‖ ciphertext ‖ tag]` after
/// the handshake. `None` sends encode the in-band end-of-stream sentinels
/// (see [`veil_core::message`]); received sentinels surface as `None`.
///
/// Without a PSK in the [`ChannelConfig`] the handshake is unauthenticated
/// and insecure against an active man-in-the-middle.
pub struct SecureStream {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    handshake: Mutex<()>,
    envelope: OnceLock<Envelope>,
    role: Role,
    state: StateCell,
    broken: AtomicBool,
    closed: AtomicBool,
    read_timeout: SyncMutex<Option<Duration>>,
    config: ChannelConfig,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl SecureStream {
    /// Connect to `addr` and take the Client role.
    ///
    /// The handshake is deferred to the first send or receive.
    pub async fn connect(addr: SocketAddr, config: ChannelConfig) -> Result<Self> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_keepalive(config.keep_alive)?;
        let stream = socket.connect(addr).await?;
        Self::from_stream(stream, Role::Client, config)
    }

    /// Like [`connect`](Self::connect), bounded by `limit`.
    pub async fn connect_timeout(
        addr: SocketAddr,
        config: ChannelConfig,
        limit: Duration,
    ) -> Result<Self> {
        timeout(limit, Self::connect(addr, config))
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Wrap an already-connected stream with an explicit role.
    ///
    /// The listener uses this with [`Role::Server`]; it is public so a
    /// caller with its own accept loop can do the same.
    pub fn from_stream(stream: TcpStream, role: Role, config: ChannelConfig) -> Result<Self> {
        stream.set_nodelay(config.tcp_nodelay)?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: Mutex::new(BufReader::with_capacity(config.buffer_size, read_half)),
            writer: Mutex::new(BufWriter::with_capacity(config.buffer_size, write_half)),
            handshake: Mutex::new(()),
            envelope: OnceLock::new(),
            role,
            state: StateCell::new(),
            broken: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            read_timeout: SyncMutex::new(config.read_timeout),
            config,
            peer_addr,
            local_addr,
        })
    }

    // === Send operations ===

    /// Send a string message, or the end-of-stream sentinel for `None`.
    ///
    /// Returns the number of bytes put on the wire.
    pub async fn send_str(&self, message: Option<&str>) -> Result<usize> {
        self.send_plain(&message::encode_str(message)).await
    }

    /// Send a byte message, or the end-of-stream sentinel for `None`.
    pub async fn send_bytes(&self, message: Option<&[u8]>) -> Result<usize> {
        self.send_plain(&message::encode_bytes(message)).await
    }

    /// Send a 32-bit integer (4 bytes big-endian inside the envelope).
    pub async fn send_i32(&self, value: i32) -> Result<usize> {
        self.send_plain(&message::encode_i32(value)).await
    }

    // === Receive operations ===

    /// Receive a string message; the end-of-stream sentinel surfaces as
    /// `None`.
    pub async fn receive_str(&self) -> Result<Option<String>> {
        message::decode_str(self.receive_plain().await?)
    }

    /// Receive a byte message; the end-of-stream sentinel surfaces as
    /// `None`.
    pub async fn receive_bytes(&self) -> Result<Option<Vec<u8>>> {
        Ok(message::decode_bytes(self.receive_plain().await?))
    }

    /// Receive a 32-bit integer.
    pub async fn receive_i32(&self) -> Result<i32> {
        message::decode_i32(&self.receive_plain().await?)
    }

    // === Lifecycle ===

    /// Close the channel. Idempotent: only the first call shuts the
    /// stream down; every call leaves the channel in [`State::Closed`].
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.state.store(State::Closing);
        let mut writer = self.writer.lock().await;
        // The peer may already be gone; the socket is released regardless.
        let _ = writer.shutdown().await;
        drop(writer);
        self.state.store(State::Closed);
        Ok(())
    }

    /// Whether an OS-level disconnect has permanently broken the channel.
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the handshake has completed on this channel.
    pub fn is_established(&self) -> bool {
        self.envelope.get().is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state.load()
    }

    /// This side's role in the key exchange.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replace the read timeout applied to subsequent receives. `None`
    /// waits indefinitely.
    pub fn set_read_timeout(&self, limit: Option<Duration>) {
        *self.read_timeout.lock() = limit;
    }

    /// The read timeout currently applied to receives.
    pub fn read_timeout(&self) -> Option<Duration> {
        *self.read_timeout.lock()
    }

    // === Internals ===

    async fn send_plain(&self, plain: &[u8]) -> Result<usize> {
        let envelope = self.ensure_established().await?;
        let sealed = envelope.seal(plain).map_err(Error::Crypto)?;
        self.send_frame(&sealed).await
    }

    async fn receive_plain(&self) -> Result<Vec<u8>> {
        let envelope = self.ensure_established().await?;
        let sealed = self.receive_frame().await?;
        match envelope.open(&sealed) {
            Ok(plain) => Ok(plain),
            Err(veil_crypto::Error::AuthenticationFailed) => {
                // A bad tag on an established channel is tampering.
                self.mark_broken().await;
                Err(Error::AuthenticationFailed)
            }
            Err(e) => {
                self.mark_broken().await;
                Err(Error::Crypto(e))
            }
        }
    }

    /// Write one frame: header, payload and flush under a single lock
    /// scope, so concurrent senders never interleave.
    async fn send_frame(&self, payload: &[u8]) -> Result<usize> {
        if self.broken.load(Ordering::Acquire) {
            return Err(Error::ConnectionBroken);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let header = frame::encode_header(payload.len(), self.config.max_frame_size)?;

        let mut writer = self.writer.lock().await;
        let written = async {
            writer.write_all(&header).await?;
            writer.write_all(payload).await?;
            writer.flush().await
        }
        .await;
        drop(writer);

        match written {
            Ok(()) => Ok(frame::HEADER_LEN + payload.len()),
            Err(e) if is_disconnect(&e) => {
                self.mark_broken().await;
                Err(Error::ConnectionBroken)
            }
            Err(e) => {
                // The frame may be partially on the wire; the stream is
                // unusable either way.
                self.mark_broken().await;
                Err(Error::Io(e))
            }
        }
    }

    /// Read one frame on the established channel, applying the configured
    /// read timeout and the fatal-error bookkeeping.
    async fn receive_frame(&self) -> Result<Vec<u8>> {
        if self.broken.load(Ordering::Acquire) {
            return Err(Error::ConnectionBroken);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let result = self.read_one_frame(self.read_timeout()).await;
        match result {
            Ok(payload) => Ok(payload),
            Err(Error::Timeout) => Err(Error::Timeout),
            Err(Error::PeerClosed) => {
                let _ = self.close().await;
                Err(Error::PeerClosed)
            }
            Err(e) => {
                self.mark_broken().await;
                Err(e)
            }
        }
    }

    async fn read_one_frame(&self, limit: Option<Duration>) -> Result<Vec<u8>> {
        let mut reader = self.reader.lock().await;
        read_frame(&mut *reader, self.config.max_frame_size, limit).await
    }

    async fn mark_broken(&self) {
        if !self.broken.swap(true, Ordering::AcqRel) {
            warn!(peer = %self.peer_addr, "channel broken");
        }
        let _ = self.close().await;
    }

    /// Fast path once established; otherwise drive the handshake under its
    /// mutex. Concurrent operations block here until the exchange resolves.
    async fn ensure_established(&self) -> Result<&Envelope> {
        if let Some(envelope) = self.envelope.get() {
            return Ok(envelope);
        }

        let _guard = self.handshake.lock().await;
        if let Some(envelope) = self.envelope.get() {
            // Another task finished the handshake while we waited.
            return Ok(envelope);
        }
        if self.broken.load(Ordering::Acquire) {
            return Err(Error::ConnectionBroken);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        self.state.store(State::Handshaking);
        let outcome = match self.role {
            Role::Server => self.server_handshake().await,
            Role::Client => self.client_handshake().await,
        };

        match outcome {
            Ok(envelope) => {
                let envelope = self.envelope.get_or_init(|| envelope);
                self.state.store(State::Established);
                debug!(role = ?self.role, peer = %self.peer_addr, "handshake complete");
                Ok(envelope)
            }
            Err(e) => {
                let e = as_handshake_error(e);
                warn!(role = ?self.role, peer = %self.peer_addr, error = %e, "handshake failed");
                let _ = self.close().await;
                Err(e)
            }
        }
    }

    /// Server side: send our key payload, then wait for the client's
    /// inside the zombie-defense window.
    async fn server_handshake(&self) -> Result<Envelope> {
        let exchange = KeyExchange::new(self.config.psk.clone());
        self.send_frame(&exchange.local_payload()?).await?;

        // A peer that never advances the exchange costs at most this
        // window before the slot is released.
        let payload = match timeout(
            self.config.handshake_window,
            self.read_one_frame(None),
        )
        .await
        {
            Ok(read) => read?,
            Err(_) => return Err(Error::HandshakeTimeout),
        };

        let peer_public = exchange.peer_public_key(&payload)?;
        exchange.into_envelope(&peer_public, kdf::STREAM_INFO)
    }

    /// Client side: read the server's key payload, answer with ours, then
    /// verify and derive. Reads inherit the caller's read timeout.
    async fn client_handshake(&self) -> Result<Envelope> {
        let exchange = KeyExchange::new(self.config.psk.clone());
        let payload = self.read_one_frame(self.read_timeout()).await?;
        self.send_frame(&exchange.local_payload()?).await?;

        let peer_public = exchange.peer_public_key(&payload)?;
        exchange.into_envelope(&peer_public, kdf::STREAM_INFO)
    }
}

/// Broken-pipe categories, canonicalized by error kind rather than by the
/// locale-dependent message text the OS produces.
fn is_disconnect(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
    )
}

/// Run `fut`, bounded by `limit` when one is set. `None` means elapsed.
async fn maybe_timeout<T>(
    limit: Option<Duration>,
    fut: impl std::future::Future<Output = T>,
) -> Option<T> {
    match limit {
        Some(limit) => timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Read one length-prefixed frame.
///
/// A timeout before the first header byte has consumed nothing and is
/// recoverable. Once any byte of the frame has been read, a timeout or an
/// end-of-stream leaves the stream broken mid-frame and is reported as
/// `Truncated`. The header is validated before the body is allocated.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    max_frame_size: u32,
    read_timeout: Option<Duration>,
) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; frame::HEADER_LEN];

    match maybe_timeout(read_timeout, reader.read_exact(&mut header[..1])).await {
        None => return Err(Error::Timeout),
        Some(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => return Err(Error::PeerClosed),
        Some(Err(e)) if is_disconnect(&e) => return Err(Error::ConnectionBroken),
        Some(Err(e)) => return Err(Error::Io(e)),
        Some(Ok(_)) => {}
    }

    match maybe_timeout(read_timeout, reader.read_exact(&mut header[1..])).await {
        None => return Err(Error::Truncated),
        Some(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => return Err(Error::Truncated),
        Some(Err(e)) if is_disconnect(&e) => return Err(Error::ConnectionBroken),
        Some(Err(e)) => return Err(Error::Io(e)),
        Some(Ok(_)) => {}
    }

    let len = frame::decode_header(header, max_frame_size)? as usize;
    let mut payload = vec![0u8; len];
    if len > 0 {
        match maybe_timeout(read_timeout, reader.read_exact(&mut payload)).await {
            None => return Err(Error::Truncated),
            Some(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => return Err(Error::Truncated),
            Some(Err(e)) if is_disconnect(&e) => return Err(Error::ConnectionBroken),
            Some(Err(e)) => return Err(Error::Io(e)),
            Some(Ok(_)) => {}
        }
    }

    Ok(payload)
}
