//! HTTP CONNECT gateway
//!
//! The local listener implementing the CONNECT tunneling convention. Each
//! accepted connection walks a short state machine: parse the request line,
//! reject anything that is not CONNECT, detach the socket into raw byte
//! mode, acknowledge with the literal `200 Connection Established` response,
//! then hand off to the dialer and pump. Every session is an isolated task;
//! nothing it does can block the accept loop or touch another session.

use crate::transport::TunnelDialer;
use crate::tunnel::pump;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Exact acknowledgement written onto the raw socket; no HTTP framing
/// follows it, only opaque tunneled payload.
const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

const SERVICE_UNAVAILABLE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\r\n";

/// Listener for inbound proxy clients
pub struct ConnectGateway {
    listener: TcpListener,
}

impl ConnectGateway {
    /// Bind the listening socket. Failure here is a start-time failure of
    /// the whole service, not a per-session error.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Address the gateway is actually bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the stop signal fires.
    ///
    /// Accept errors are logged and never stop the listener. Stopping only
    /// ends acceptance; sessions already tunneling drain on their own I/O.
    pub async fn run<D: TunnelDialer>(
        self,
        dialer: Arc<D>,
        chunk_bytes: usize,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("gateway stopped accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "proxy client connected");
                            let dialer = Arc::clone(&dialer);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, dialer, chunk_bytes).await {
                                    debug!(%peer, error = %e, "session ended with error");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
            }
        }
    }
}

/// Drive one accepted connection from CONNECT parsing through teardown.
async fn handle_connection<D: TunnelDialer>(
    stream: TcpStream,
    dialer: Arc<D>,
    chunk_bytes: usize,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        // Client connected and went away without a request.
        return Ok(());
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("").to_string();

    if method != "CONNECT" || target.is_empty() {
        debug!(method, "rejecting non-CONNECT request");
        let mut stream = reader.into_inner();
        stream.write_all(SERVICE_UNAVAILABLE).await?;
        return Ok(());
    }

    // Drain the remaining request headers; the tunnel does not use them.
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
            break;
        }
    }

    // Detach into raw byte mode. Bytes the client pipelined ahead of the
    // acknowledgement are sitting in the read buffer and would be lost on
    // detach, so such a connection cannot be hijacked cleanly.
    if !reader.buffer().is_empty() {
        let mut stream = reader.into_inner();
        stream
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\n\r\nconnection does not support tunneling\n")
            .await?;
        return Ok(());
    }
    let mut client = reader.into_inner();

    client.write_all(CONNECT_ESTABLISHED).await?;
    info!(target = %target, "tunnel session opened");

    run_session(client, target, dialer, chunk_bytes).await;
    Ok(())
}

/// Establish the tunnel and pump until the session dies.
///
/// Session identity is just this task's local state: the client socket, the
/// target host, and (once dialed) the tunnel stream. A dial failure ends
/// only this session.
async fn run_session<D: TunnelDialer>(
    client: TcpStream,
    target: String,
    dialer: Arc<D>,
    chunk_bytes: usize,
) {
    match dialer.dial(&target).await {
        Ok(tunnel) => pump(client, tunnel, chunk_bytes).await,
        Err(e) => error!(target = %target, error = %e, "failed to establish tunnel"),
    }
}
