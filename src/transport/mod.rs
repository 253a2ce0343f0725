//! Relay transport layer
//!
//! Provides the fingerprinted dialer that turns a CONNECT target into a live
//! tunnel stream: TCP to the relay, disguised TLS handshake, then a WebSocket
//! upgrade carrying the target host and shared secret in request headers.
//!
//! The [`TunnelDialer`] trait is the seam between the gateway and the
//! network; tests drive the gateway with an in-memory implementation.

mod dialer;

pub use dialer::{RelayDialer, TunnelStream};

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::WebSocketStream;

/// Dial-phase errors; each ends only the session being established
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("TCP connect to relay failed: {0}")]
    Connect(#[source] io::Error),

    #[error("invalid relay host name: {0}")]
    InvalidRelayHost(String),

    #[error("header value is not valid: {0}")]
    InvalidHeader(String),

    #[error("fingerprint configuration error: {0}")]
    Fingerprint(#[from] crate::obfuscation::FingerprintError),

    #[error("TLS handshake with relay failed: {0}")]
    Tls(#[source] io::Error),

    #[error("timed out establishing relay tunnel")]
    Timeout,

    #[error("WebSocket upgrade failed: {0}")]
    Upgrade(#[from] tungstenite::Error),

    #[error(transparent)]
    Handshake(#[from] TunnelHandshakeError),
}

/// The relay answered the upgrade request with something other than 101.
///
/// The response body is kept verbatim for diagnostics; misconfigured shared
/// secrets and relay-side blocks surface here.
#[derive(Debug, thiserror::Error)]
#[error("relay rejected tunnel handshake with status {status}: {body}")]
pub struct TunnelHandshakeError {
    pub status: u16,
    pub body: String,
}

/// Establishes tunnel streams to the relay.
///
/// One `dial` call per session; implementations never retry internally.
#[async_trait]
pub trait TunnelDialer: Send + Sync + 'static {
    /// Underlying byte stream the WebSocket is framed over
    type Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Produce a handshake-complete tunnel stream for the given
    /// `host:port` target, or fail without side effects.
    async fn dial(
        &self,
        target: &str,
    ) -> Result<WebSocketStream<Self::Transport>, DialError>;
}
