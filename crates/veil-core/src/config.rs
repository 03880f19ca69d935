//! Per-instance configuration.
//!
//! Every channel and listener carries its own configuration, fixed at
//! construction; there is no process-global state. Listeners pass their
//! `ChannelConfig` on to the channels they accept.

use std::time::Duration;

use veil_crypto::PresharedKey;

/// Default maximum frame size: 64 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Default server-side handshake window.
pub const DEFAULT_HANDSHAKE_WINDOW: Duration = Duration::from_millis(1000);

/// Default internal read/write buffer capacity: 32 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Default maximum UDP payload (IPv4 theoretical maximum).
pub const DEFAULT_MAX_UDP_PAYLOAD: usize = 65507;

/// Configuration for one stream channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Largest frame accepted or produced, in bytes.
    pub max_frame_size: u32,
    /// Internal read/write buffer capacity in bytes.
    pub buffer_size: usize,
    /// Bound on the server-side handshake; a peer that does not complete
    /// the key exchange within this window costs `HandshakeTimeout` and
    /// nothing more.
    pub handshake_window: Duration,
    /// Initial read timeout applied to each receive. `None` waits
    /// indefinitely. Adjustable later via the channel.
    pub read_timeout: Option<Duration>,
    /// Pre-shared key authenticating handshake public keys. Without one
    /// the handshake is unauthenticated.
    pub psk: Option<PresharedKey>,
    /// Enable `SO_KEEPALIVE` on stream sockets.
    pub keep_alive: bool,
    /// Disable Nagle's algorithm on stream sockets.
    pub tcp_nodelay: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            handshake_window: DEFAULT_HANDSHAKE_WINDOW,
            read_timeout: None,
            psk: None,
            keep_alive: true,
            tcp_nodelay: true,
        }
    }
}

/// Configuration for a listening endpoint.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Configuration handed to every accepted channel.
    pub channel: ChannelConfig,
    /// Receive-buffer size requested for the listening socket, sized for
    /// accept bursts. `None` keeps the OS default.
    pub recv_buffer_size: Option<u32>,
    /// Enable `SO_REUSEADDR` on the listening socket.
    pub reuse_addr: bool,
    /// Listen backlog.
    pub backlog: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            recv_buffer_size: None,
            reuse_addr: true,
            backlog: 1024,
        }
    }
}

/// Configuration for one datagram channel.
#[derive(Debug, Clone)]
pub struct DatagramConfig {
    /// Pre-shared key authenticating handshake public keys.
    pub psk: Option<PresharedKey>,
    /// Largest UDP payload one packet may carry. The largest plaintext is
    /// this minus the envelope overhead.
    pub max_udp_payload: usize,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            psk: None,
            max_udp_payload: DEFAULT_MAX_UDP_PAYLOAD,
        }
    }
}
