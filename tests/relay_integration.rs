//! End-to-end relay integration tests: a mock client duplex (an in-memory
//! byte pipe, standing in for what the WebSocket/xhttp adapters would hand
//! the relay) and a real loopback TCP "remote", driven through
//! `relay::relay` exactly as `ingress::run_relay` drives it in production,
//! including the abort watcher.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use vless_edge::abort;
use vless_edge::duplex::DuplexClient;
use vless_edge::relay;
use vless_edge::settings::RelayScheduler;
use vless_edge::vless::VlessRequest;

async fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let client_side = TcpStream::connect(addr).await.unwrap();
    let server_side = accept.await.unwrap();
    (client_side, server_side)
}

fn mock_client() -> (tokio::io::DuplexStream, DuplexClient, CancellationToken) {
    let (test_side, client_internal) = tokio::io::duplex(4096);
    let (client_read, client_write) = tokio::io::split(client_internal);
    let signal = CancellationToken::new();
    let client = DuplexClient::new(
        Box::pin(client_read),
        Box::pin(client_write),
        signal.clone(),
        Arc::new(|| {}),
    );
    (test_side, client, signal)
}

/// Scenario 6 from the header-codec/relay test suite: the mock client writes
/// "PING" post-header, the mock remote echoes "PONG", and the client side
/// observes `[version, 0x00]` prefixed to the echoed bytes.
#[tokio::test]
async fn test_pipe_relay_round_trip() {
    let (mut test_side, client, _signal) = mock_client();

    let (remote_side, mut mock_remote) = loopback_pair().await;
    let remote = Arc::new(remote_side);

    let vless = VlessRequest {
        hostname: "example.test".to_string(),
        port: 443,
        data: Bytes::from_static(b"PING"),
        resp: [0x00, 0x00],
    };

    let remote_task = tokio::spawn(async move {
        let mut buf = [0u8; 4];
        mock_remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");
        mock_remote.write_all(b"PONG").await.unwrap();
        mock_remote
    });

    let relay_handle = tokio::spawn(async move {
        relay::relay(
            client,
            remote,
            &vless,
            RelayScheduler::Pipe,
            2048 * 1024,
            Duration::ZERO,
        )
        .await;
    });

    let mut received = vec![0u8; 6];
    test_side.read_exact(&mut received).await.unwrap();
    assert_eq!(received, [0x00, 0x00, b'P', b'O', b'N', b'G']);

    // Dropping both ends of the mock transport lets each pump observe EOF
    // on its source (client read side, remote read side) so the relay can
    // settle without any abort.
    let mock_remote = remote_task.await.unwrap();
    drop(test_side);
    drop(mock_remote);

    relay_handle.await.unwrap();
}

/// Same round trip under the `yield` scheduler, sliced at 2 bytes per
/// iteration so the copy genuinely takes multiple slices.
#[tokio::test]
async fn test_yield_relay_round_trip() {
    let (mut test_side, client, _signal) = mock_client();

    let (remote_side, mut mock_remote) = loopback_pair().await;
    let remote = Arc::new(remote_side);

    let vless = VlessRequest {
        hostname: "example.test".to_string(),
        port: 443,
        data: Bytes::from_static(b"PING"),
        resp: [0x00, 0x00],
    };

    let remote_task = tokio::spawn(async move {
        let mut buf = [0u8; 4];
        mock_remote.read_exact(&mut buf).await.unwrap();
        mock_remote.write_all(b"PONG").await.unwrap();
    });

    let relay_handle = tokio::spawn(async move {
        relay::relay(
            client,
            remote,
            &vless,
            RelayScheduler::Yield,
            2,
            Duration::ZERO,
        )
        .await;
    });

    let mut received = vec![0u8; 6];
    test_side.read_exact(&mut received).await.unwrap();
    assert_eq!(received, [0x00, 0x00, b'P', b'O', b'N', b'G']);

    remote_task.await.unwrap();
    drop(test_side);
    relay_handle.await.unwrap();
}

/// Aborting the client's signal mid-stream must cause both pumps to settle
/// and, after the watcher's poll interval plus grace period, force-close the
/// remote — all within a bounded time (here driven by paused virtual time
/// rather than a real 7s sleep).
#[tokio::test(start_paused = true)]
async fn test_abort_settles_and_watcher_force_closes_remote() {
    let (test_side, client, signal) = mock_client();

    let (remote_side, _mock_remote) = loopback_pair().await;
    let remote = Arc::new(remote_side);
    let remote_for_relay = remote.clone();

    let vless = VlessRequest {
        hostname: "unused".to_string(),
        port: 1,
        data: Bytes::new(),
        resp: [0x00, 0x00],
    };

    let watcher = abort::watch(signal.clone(), remote.clone());
    let relay_handle = tokio::spawn(async move {
        relay::relay(
            client,
            remote_for_relay,
            &vless,
            RelayScheduler::Pipe,
            2048 * 1024,
            Duration::ZERO,
        )
        .await;
    });

    signal.cancel();
    drop(test_side);

    tokio::time::advance(Duration::from_secs(3) + Duration::from_secs(3) + Duration::from_millis(50)).await;

    relay_handle.await.unwrap();
    watcher.await.unwrap();

    let mut buf = [0u8; 1];
    assert_eq!(remote.try_read(&mut buf).unwrap(), 0);
}
