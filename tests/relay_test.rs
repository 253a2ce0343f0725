//! Integration tests for the CONNECT gateway and duplex pump
//!
//! The gateway is driven end to end over real loopback sockets, with the
//! relay replaced by a stub dialer that hands each session an in-memory
//! WebSocket. The stub's far end plays the relay in the assertions.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use ghostbridge::transport::{DialError, TunnelDialer};
use ghostbridge::{Config, Error, TunnelService};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const CONNECT_OK: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Dialer stub: every dial yields one end of an in-memory pipe wrapped as a
/// client-role WebSocket; the far end goes to the test through a channel.
struct StubDialer {
    tunnels: mpsc::Sender<DuplexStream>,
    dials: AtomicUsize,
}

#[async_trait]
impl TunnelDialer for StubDialer {
    type Transport = DuplexStream;

    async fn dial(&self, _target: &str) -> Result<WebSocketStream<DuplexStream>, DialError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let (near, far) = tokio::io::duplex(1024 * 1024);
        let ws = WebSocketStream::from_raw_socket(near, Role::Client, None).await;
        self.tunnels.send(far).await.map_err(|_| DialError::Timeout)?;
        Ok(ws)
    }
}

struct TestRig {
    service: TunnelService,
    addr: SocketAddr,
    tunnels: mpsc::Receiver<DuplexStream>,
    dialer: Arc<StubDialer>,
}

fn test_config(port: u16, chunk: i32) -> Config {
    Config {
        port,
        password: "secret".to_string(),
        wss: "relay.test".to_string(),
        chunk,
    }
}

/// Reserve an ephemeral port and release it for the service to bind.
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn start_rig(chunk: i32) -> TestRig {
    let (tunnels_tx, tunnels_rx) = mpsc::channel(4);
    let dialer = Arc::new(StubDialer {
        tunnels: tunnels_tx,
        dials: AtomicUsize::new(0),
    });

    let mut service = TunnelService::new();
    service
        .start_with_dialer(&test_config(free_port(), chunk), Arc::clone(&dialer))
        .await
        .expect("service failed to start");
    let port = service.local_addr().unwrap().port();

    TestRig {
        service,
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        tunnels: tunnels_rx,
        dialer,
    }
}

/// Open a proxy connection, complete the CONNECT exchange, and return the
/// client socket plus the relay-side WebSocket for that session.
async fn open_session(
    rig: &mut TestRig,
) -> (TcpStream, WebSocketStream<DuplexStream>) {
    let mut client = TcpStream::connect(rig.addr).await.unwrap();
    client
        .write_all(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
        .await
        .unwrap();

    let mut ack = [0u8; CONNECT_OK.len()];
    client.read_exact(&mut ack).await.unwrap();
    assert_eq!(&ack, CONNECT_OK);

    let far = tokio::time::timeout(Duration::from_secs(5), rig.tunnels.recv())
        .await
        .expect("dialer was not invoked")
        .unwrap();
    let relay = WebSocketStream::from_raw_socket(far, Role::Server, None).await;
    (client, relay)
}

#[tokio::test]
async fn test_invalid_chunk_size_fails_before_bind() {
    let port = free_port();
    let mut service = TunnelService::new();

    let result = service.start(&test_config(port, 0)).await;
    assert!(matches!(result, Err(Error::Config(_))));
    assert!(!service.is_running());
    assert!(service.local_addr().is_none());

    // Nothing may be listening on the configured port.
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());

    let result = service.start(&test_config(port, -16)).await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_connect_acknowledged_with_exact_literal() {
    let mut rig = start_rig(64).await;
    let (_client, _relay) = open_session(&mut rig).await;
    assert_eq!(rig.dialer.dials.load(Ordering::SeqCst), 1);
    rig.service.stop();
}

#[tokio::test]
async fn test_non_connect_request_gets_503_without_dialing() {
    let mut rig = start_rig(64).await;

    let mut client = TcpStream::connect(rig.addr).await.unwrap();
    client
        .write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
        .await
        .unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert!(response.starts_with(b"HTTP/1.1 503 "));

    assert_eq!(rig.dialer.dials.load(Ordering::SeqCst), 0);
    rig.service.stop();
}

#[tokio::test]
async fn test_pipelined_payload_before_ack_gets_500() {
    let mut rig = start_rig(64).await;

    // Payload sent in the same segment as the request cannot survive the
    // switch to raw byte mode, so the connection must be refused.
    let mut client = TcpStream::connect(rig.addr).await.unwrap();
    client
        .write_all(
            b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\nEARLY BYTES",
        )
        .await
        .unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert!(response.starts_with(b"HTTP/1.1 500 "));

    assert_eq!(rig.dialer.dials.load(Ordering::SeqCst), 0);
    rig.service.stop();
}

#[tokio::test]
async fn test_small_payload_roundtrip() {
    let mut rig = start_rig(64).await;
    let (mut client, mut relay) = open_session(&mut rig).await;

    // Upstream: ten client bytes arrive as one binary frame.
    client.write_all(b"0123456789").await.unwrap();
    match relay.next().await.unwrap().unwrap() {
        Message::Binary(data) => assert_eq!(&data, b"0123456789"),
        other => panic!("expected binary frame, got {:?}", other),
    }

    // Downstream: a binary frame lands on the client byte-for-byte.
    relay
        .send(Message::Binary(b"pong".to_vec()))
        .await
        .unwrap();
    let mut received = [0u8; 4];
    client.read_exact(&mut received).await.unwrap();
    assert_eq!(&received, b"pong");

    rig.service.stop();
}

#[tokio::test]
async fn test_large_payload_split_at_chunk_boundary() {
    let chunk_kib = 64;
    let mut rig = start_rig(chunk_kib).await;
    let (client, mut relay) = open_session(&mut rig).await;

    let payload: Vec<u8> = (0..200 * 1024u32).map(|i| (i % 253) as u8).collect();

    // Upstream 200 KiB with a 64 KiB chunk: several frames, none larger
    // than a chunk, in-order byte-for-byte.
    let to_send = payload.clone();
    let writer = tokio::spawn(async move {
        let mut client = client;
        client.write_all(&to_send).await.unwrap();
        client
    });

    let chunk_bytes = chunk_kib as usize * 1024;
    let mut received = Vec::new();
    let mut frames = 0usize;
    while received.len() < payload.len() {
        match relay.next().await.unwrap().unwrap() {
            Message::Binary(data) => {
                assert!(data.len() <= chunk_bytes);
                received.extend_from_slice(&data);
                frames += 1;
            }
            other => panic!("expected binary frame, got {:?}", other),
        }
    }
    assert_eq!(received, payload);
    assert!(frames >= 4, "200 KiB should span at least 4 frames, got {}", frames);

    // Downstream: one oversized frame still reaches the client intact.
    let mut client = writer.await.unwrap();
    relay.send(Message::Binary(payload.clone())).await.unwrap();
    let mut received = vec![0u8; payload.len()];
    client.read_exact(&mut received).await.unwrap();
    assert_eq!(received, payload);

    rig.service.stop();
}

#[tokio::test]
async fn test_non_binary_frames_discarded() {
    let mut rig = start_rig(64).await;
    let (mut client, mut relay) = open_session(&mut rig).await;

    relay
        .send(Message::Text("relay status chatter".to_string()))
        .await
        .unwrap();
    relay.send(Message::Ping(vec![1, 2, 3])).await.unwrap();
    relay
        .send(Message::Binary(b"still alive".to_vec()))
        .await
        .unwrap();

    // Only the binary payload may reach the client.
    let mut received = [0u8; 11];
    client.read_exact(&mut received).await.unwrap();
    assert_eq!(&received, b"still alive");

    rig.service.stop();
}

#[tokio::test]
async fn test_client_close_tears_down_tunnel() {
    let mut rig = start_rig(64).await;
    let (mut client, mut relay) = open_session(&mut rig).await;

    // Mid-transfer traffic, then the client goes away.
    client.write_all(b"partial").await.unwrap();
    match relay.next().await.unwrap().unwrap() {
        Message::Binary(data) => assert_eq!(&data, b"partial"),
        other => panic!("expected binary frame, got {:?}", other),
    }
    drop(client);

    // The tunnel side must observe termination promptly, not hang.
    let observed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match relay.next().await {
                None => break,
                Some(Err(_)) => break,
                Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(observed.is_ok(), "tunnel side never observed client close");

    rig.service.stop();
}

#[tokio::test]
async fn test_stop_is_idempotent_and_start_guarded() {
    // stop before start: no-op.
    let mut service = TunnelService::new();
    service.stop();
    assert!(!service.is_running());

    let mut rig = start_rig(64).await;

    // start while running: rejected, original listener unaffected.
    let second = rig
        .service
        .start_with_dialer(&test_config(free_port(), 64), Arc::clone(&rig.dialer))
        .await;
    assert!(matches!(second, Err(Error::AlreadyRunning)));
    let (_client, _relay) = open_session(&mut rig).await;

    // stop twice: idempotent.
    rig.service.stop();
    rig.service.stop();
    assert!(!rig.service.is_running());

    // The listener is gone shortly after stop.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(TcpStream::connect(rig.addr).await.is_err());
}

#[tokio::test]
async fn test_service_can_restart_after_stop() {
    let mut rig = start_rig(64).await;
    rig.service.stop();
    tokio::time::sleep(Duration::from_millis(200)).await;

    rig.service
        .start_with_dialer(&test_config(free_port(), 64), Arc::clone(&rig.dialer))
        .await
        .expect("restart failed");
    rig.addr = rig.service.local_addr().unwrap();
    rig.addr.set_ip([127, 0, 0, 1].into());

    let (_client, _relay) = open_session(&mut rig).await;
    rig.service.stop();
}
