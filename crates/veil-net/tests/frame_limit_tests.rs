//! Maximum-frame-size enforcement, on both sides of the wire.

use std::time::Duration;

use tokio::time::timeout;
use veil_net::{ChannelConfig, Error, ListenerConfig, SecureListener, SecureStream};

const GUARD: Duration = Duration::from_secs(5);

/// A receiver rejects an incoming frame above its own limit before
/// reading the body, and the channel is dead afterwards.
#[tokio::test]
async fn oversized_incoming_frame_is_fatal() {
    // The server accepts at most 4 KiB frames; the client will happily
    // produce a bigger one under its default 64 MiB limit.
    let listener = SecureListener::bind(
        "127.0.0.1:0".parse().unwrap(),
        ListenerConfig {
            channel: ChannelConfig {
                max_frame_size: 4096,
                ..ChannelConfig::default()
            },
            ..ListenerConfig::default()
        },
    )
    .await
    .unwrap();
    let addr = listener.local_addr();

    let server_task = tokio::spawn(async move {
        let server = listener.accept().await.unwrap();

        // Establish on a small message first.
        assert_eq!(server.receive_str().await.unwrap().as_deref(), Some("hi"));

        let err = server.receive_bytes().await.unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { max: 4096, .. }));
        assert!(server.is_broken());

        // Broken is sticky.
        let err = server.receive_bytes().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionBroken));
    });

    let client = SecureStream::connect(addr, ChannelConfig::default())
        .await
        .unwrap();
    client.send_str(Some("hi")).await.unwrap();
    client.send_bytes(Some(&vec![0xabu8; 5000])).await.unwrap();

    timeout(GUARD, server_task).await.unwrap().unwrap();
}

/// A sender refuses to put an oversized frame on the wire, and the
/// refusal does not damage the channel.
#[tokio::test]
async fn oversized_send_is_rejected_locally() {
    let listener = SecureListener::bind("127.0.0.1:0".parse().unwrap(), ListenerConfig::default())
        .await
        .unwrap();
    let addr = listener.local_addr();

    let server_task = tokio::spawn(async move {
        let server = listener.accept().await.unwrap();
        assert_eq!(server.receive_str().await.unwrap().as_deref(), Some("ok"));
        assert_eq!(
            server.receive_str().await.unwrap().as_deref(),
            Some("still ok")
        );
    });

    let client = SecureStream::connect(
        addr,
        ChannelConfig {
            max_frame_size: 1024,
            ..ChannelConfig::default()
        },
    )
    .await
    .unwrap();

    client.send_str(Some("ok")).await.unwrap();

    let err = client.send_bytes(Some(&vec![0u8; 2000])).await.unwrap_err();
    assert!(matches!(err, Error::FrameTooLarge { max: 1024, .. }));
    assert!(!client.is_broken());

    // The channel survives the local rejection.
    client.send_str(Some("still ok")).await.unwrap();

    timeout(GUARD, server_task).await.unwrap().unwrap();
}
