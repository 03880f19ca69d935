//! PSK-authenticated handshake tests.

use std::time::{Duration, Instant};

use tokio::time::timeout;
use veil_net::{
    ChannelConfig, Error, ListenerConfig, PresharedKey, SecureListener, SecureStream, State,
};

const GUARD: Duration = Duration::from_secs(5);

fn config_with_psk(psk: &[u8]) -> ChannelConfig {
    ChannelConfig {
        psk: Some(PresharedKey::new(psk.to_vec()).unwrap()),
        ..ChannelConfig::default()
    }
}

/// Matching PSKs: the handshake completes and traffic flows.
#[tokio::test]
async fn matching_psk_accepts() {
    let psk = [0x5c; 16];
    let listener = SecureListener::bind(
        "127.0.0.1:0".parse().unwrap(),
        ListenerConfig {
            channel: config_with_psk(&psk),
            ..ListenerConfig::default()
        },
    )
    .await
    .unwrap();
    let addr = listener.local_addr();

    let server_task = tokio::spawn(async move {
        let server = listener.accept().await.unwrap();
        assert_eq!(server.receive_str().await.unwrap().as_deref(), Some("ping"));
        server.send_str(Some("ping")).await.unwrap();
    });

    let client = SecureStream::connect(addr, config_with_psk(&psk))
        .await
        .unwrap();
    client.send_str(Some("ping")).await.unwrap();
    assert_eq!(client.receive_str().await.unwrap().as_deref(), Some("ping"));

    timeout(GUARD, server_task).await.unwrap().unwrap();
}

/// Mismatched PSKs: both sides fail authentication inside the handshake
/// window and the channels close.
#[tokio::test]
async fn mismatched_psk_rejects() {
    let listener = SecureListener::bind(
        "127.0.0.1:0".parse().unwrap(),
        ListenerConfig {
            channel: config_with_psk(b"server side key!"),
            ..ListenerConfig::default()
        },
    )
    .await
    .unwrap();
    let addr = listener.local_addr();
    let window = ChannelConfig::default().handshake_window;

    let server_task = tokio::spawn(async move {
        let server = listener.accept().await.unwrap();
        let started = Instant::now();
        let err = server.receive_str().await.unwrap_err();
        assert!(matches!(err, Error::HandshakeAuthFailed));
        assert!(started.elapsed() < window + Duration::from_millis(500));
        assert_eq!(server.state(), State::Closed);
    });

    let client = SecureStream::connect(addr, config_with_psk(b"client side key!"))
        .await
        .unwrap();
    let err = timeout(GUARD, client.send_str(Some("ping")))
        .await
        .expect("client handshake hung")
        .unwrap_err();
    assert!(matches!(err, Error::HandshakeAuthFailed));
    assert_eq!(client.state(), State::Closed);

    timeout(GUARD, server_task).await.unwrap().unwrap();
}

/// A PSK-protected server rejects a client that sends a raw, unsealed
/// public key.
#[tokio::test]
async fn psk_server_rejects_plain_client() {
    let listener = SecureListener::bind(
        "127.0.0.1:0".parse().unwrap(),
        ListenerConfig {
            channel: config_with_psk(b"server side key!"),
            ..ListenerConfig::default()
        },
    )
    .await
    .unwrap();
    let addr = listener.local_addr();

    let server_task = tokio::spawn(async move {
        let server = listener.accept().await.unwrap();
        let err = server.receive_str().await.unwrap_err();
        // A 32-byte raw key is not a sealed payload; this fails before any
        // HMAC comparison.
        assert!(matches!(err, Error::HandshakeFailed(_)));
    });

    let client = SecureStream::connect(addr, ChannelConfig::default())
        .await
        .unwrap();
    let err = timeout(GUARD, client.send_str(Some("ping")))
        .await
        .expect("client handshake hung")
        .unwrap_err();
    // The client sees a 64-byte payload where it expected a raw key.
    assert!(matches!(err, Error::HandshakeFailed(_)));

    timeout(GUARD, server_task).await.unwrap().unwrap();
}
