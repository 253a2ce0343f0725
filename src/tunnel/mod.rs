//! Duplex pump
//!
//! Relays bytes between a raw client socket and a message-framed tunnel
//! stream until either side ends. The two directions run as independent
//! tasks; the first to finish settles the session and the survivor is
//! cancelled, so no task ever outlives its session. Failures degrade to
//! "this one session ends"; the pump never retries.
//!
//! Payload is sliced at the sender's chunk-size boundary into binary
//! WebSocket frames; frame boundaries carry no meaning beyond "a contiguous
//! run of bytes to forward".

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

/// Relay I/O errors; any of these ends only the affected session
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    #[error("client read failed: {0}")]
    ClientRead(#[source] std::io::Error),

    #[error("client write failed: {0}")]
    ClientWrite(#[source] std::io::Error),

    #[error("tunnel read failed: {0}")]
    TunnelRead(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("tunnel write failed: {0}")]
    TunnelWrite(#[source] tokio_tungstenite::tungstenite::Error),
}

/// Relay bytes bidirectionally between `client` and `tunnel` until either
/// side ends, then tear the whole session down.
///
/// Blocks the calling task for the life of the session. Both underlying
/// streams are dropped (and thereby closed) by the time this returns.
pub async fn pump<C, T>(client: C, tunnel: WebSocketStream<T>, chunk_bytes: usize)
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (tunnel_sink, tunnel_stream) = tunnel.split();

    let mut downstream = tokio::spawn(run_downstream(tunnel_stream, client_write, chunk_bytes));
    let mut upstream = tokio::spawn(run_upstream(client_read, tunnel_sink, chunk_bytes));

    // tokio split halves cannot wake each other by closing the socket, so
    // the losing direction is cancelled explicitly. One direction can
    // legitimately outlive the other briefly; both outcomes are logged.
    tokio::select! {
        result = &mut downstream => {
            upstream.abort();
            log_direction("tunnel->client", result);
            log_direction("client->tunnel", upstream.await);
        }
        result = &mut upstream => {
            downstream.abort();
            log_direction("client->tunnel", result);
            log_direction("tunnel->client", downstream.await);
        }
    }
}

/// Tunnel → client: binary frames stream to the client socket one
/// chunk-size slice at a time; everything else is drained and dropped.
async fn run_downstream<T, W>(
    mut tunnel: SplitStream<WebSocketStream<T>>,
    mut client: W,
    chunk_bytes: usize,
) -> Result<(), PumpError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let chunk_bytes = chunk_bytes.max(1);

    while let Some(message) = tunnel.next().await {
        match message.map_err(PumpError::TunnelRead)? {
            Message::Binary(payload) => {
                // A message larger than one buffer-full is written
                // incrementally, never reassembled elsewhere.
                for slice in payload.chunks(chunk_bytes) {
                    client
                        .write_all(slice)
                        .await
                        .map_err(PumpError::ClientWrite)?;
                }
            }
            Message::Close(_) => break,
            // Non-binary frames never close the session.
            Message::Text(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    // FIN towards the client so a half-open peer notices the tunnel ended.
    client.shutdown().await.ok();
    Ok(())
}

/// Client → tunnel: each non-empty read becomes one binary frame.
///
/// Does not close the tunnel itself; teardown belongs to the session, which
/// happens when [`pump`] returns and both halves drop.
async fn run_upstream<R, T>(
    mut client: R,
    mut tunnel: SplitSink<WebSocketStream<T>, Message>,
    chunk_bytes: usize,
) -> Result<(), PumpError>
where
    R: AsyncRead + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_bytes.max(1)];

    loop {
        let n = client.read(&mut buf).await.map_err(PumpError::ClientRead)?;
        if n == 0 {
            return Ok(());
        }
        tunnel
            .send(Message::Binary(buf[..n].to_vec()))
            .await
            .map_err(PumpError::TunnelWrite)?;
    }
}

fn log_direction(direction: &str, result: Result<Result<(), PumpError>, JoinError>) {
    match result {
        Ok(Ok(())) => debug!(direction, "relay direction finished"),
        Ok(Err(e)) => debug!(direction, error = %e, "relay direction ended"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(direction, error = %e, "relay direction panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (
        WebSocketStream<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        let (a, b) = tokio::io::duplex(512 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    #[tokio::test]
    async fn test_upstream_frames_bounded_by_chunk_size() {
        let (tunnel, mut relay_side) = ws_pair().await;
        let (client_side, mut test_side) = tokio::io::duplex(512 * 1024);

        let session = tokio::spawn(pump(client_side, tunnel, 1024));

        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        test_side.write_all(&payload).await.unwrap();
        test_side.shutdown().await.unwrap();

        let mut received = Vec::new();
        while let Some(Ok(message)) = relay_side.next().await {
            match message {
                Message::Binary(data) => {
                    assert!(data.len() <= 1024);
                    received.extend_from_slice(&data);
                }
                Message::Close(_) => break,
                _ => {}
            }
            if received.len() == payload.len() {
                break;
            }
        }
        assert_eq!(received, payload);

        drop(test_side);
        drop(relay_side);
        session.await.unwrap();
    }

    #[tokio::test]
    async fn test_large_message_streamed_to_client() {
        let (tunnel, mut relay_side) = ws_pair().await;
        let (client_side, mut test_side) = tokio::io::duplex(512 * 1024);

        let _session = tokio::spawn(pump(client_side, tunnel, 1024));

        // One frame ten chunks long; the client must still see every byte.
        let payload: Vec<u8> = (0..10 * 1024u32).map(|i| (i % 241) as u8).collect();
        relay_side
            .send(Message::Binary(payload.clone()))
            .await
            .unwrap();

        let mut received = vec![0u8; payload.len()];
        test_side.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_text_frames_discarded_without_ending_session() {
        let (tunnel, mut relay_side) = ws_pair().await;
        let (client_side, mut test_side) = tokio::io::duplex(64 * 1024);

        let _session = tokio::spawn(pump(client_side, tunnel, 1024));

        relay_side
            .send(Message::Text("keepalive chatter".to_string()))
            .await
            .unwrap();
        relay_side
            .send(Message::Binary(b"after text".to_vec()))
            .await
            .unwrap();

        let mut received = vec![0u8; b"after text".len()];
        test_side.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"after text");
    }
}
