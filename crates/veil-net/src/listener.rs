//! Accepting listener with deny-set and zombie defense.
//!
//! The accept loop does no cryptographic work: it filters denied
//! addresses, applies socket options, and returns an unestablished
//! server-role [`SecureStream`]. The per-connection task's first receive
//! drives the handshake, bounded by the zombie-defense window from the
//! listener's channel configuration, so a single accept task can feed
//! thousands of workers.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, warn};

use veil_core::{ChannelConfig, ListenerConfig, Result};

use crate::handshake::Role;
use crate::stream::SecureStream;

/// Listening endpoint producing server-role secure channels.
///
/// The listener holds no references to the channels it accepts, and the
/// channels hold none back.
pub struct SecureListener {
    listener: TcpListener,
    deny: RwLock<HashSet<IpAddr>>,
    channel_config: ChannelConfig,
    local_addr: SocketAddr,
}

impl SecureListener {
    /// Bind a listening socket.
    ///
    /// `SO_REUSEADDR`, keep-alive and the receive-buffer size are applied
    /// to the listening socket before `listen`; accepted sockets inherit
    /// the keep-alive option from it.
    pub async fn bind(addr: SocketAddr, config: ListenerConfig) -> Result<Self> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(config.reuse_addr)?;
        socket.set_keepalive(config.channel.keep_alive)?;
        if let Some(size) = config.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        socket.bind(addr)?;

        let listener = socket.listen(config.backlog)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            deny: RwLock::new(HashSet::new()),
            channel_config: config.channel,
            local_addr,
        })
    }

    /// Accept the next permitted connection as an unestablished
    /// server-role channel.
    ///
    /// Connections from denied addresses are closed and skipped. The
    /// handshake is **not** performed here; the caller's worker performs
    /// it on first I/O.
    pub async fn accept(&self) -> Result<SecureStream> {
        loop {
            let (stream, peer) = self.listener.accept().await?;

            if self.deny.read().contains(&peer.ip()) {
                debug!(peer = %peer, "dropped connection from denied address");
                continue;
            }

            match SecureStream::from_stream(stream, Role::Server, self.channel_config.clone()) {
                Ok(channel) => {
                    debug!(peer = %peer, "accepted connection");
                    return Ok(channel);
                }
                Err(e) => {
                    // The connection died between accept and setup.
                    warn!(peer = %peer, error = %e, "dropped connection that failed setup");
                    continue;
                }
            }
        }
    }

    /// Add an address to the deny set.
    pub fn add_deny(&self, addr: IpAddr) {
        self.deny.write().insert(addr);
    }

    /// Remove an address from the deny set. Returns whether it was
    /// present.
    pub fn remove_deny(&self, addr: IpAddr) -> bool {
        self.deny.write().remove(&addr)
    }

    /// Whether an address is currently denied.
    pub fn is_denied(&self, addr: IpAddr) -> bool {
        self.deny.read().contains(&addr)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop listening and release the socket.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::ListenerConfig;

    #[tokio::test]
    async fn deny_set_membership() {
        let listener = SecureListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            ListenerConfig::default(),
        )
        .await
        .unwrap();

        let addr: IpAddr = "203.0.113.9".parse().unwrap();
        assert!(!listener.is_denied(addr));

        listener.add_deny(addr);
        assert!(listener.is_denied(addr));

        assert!(listener.remove_deny(addr));
        assert!(!listener.is_denied(addr));
        assert!(!listener.remove_deny(addr));
    }

    #[tokio::test]
    async fn binds_to_an_ephemeral_port() {
        let listener = SecureListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            ListenerConfig::default(),
        )
        .await
        .unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }
}
