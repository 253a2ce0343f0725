//! Fingerprinted transport dialer
//!
//! Connection establishment is the one moment a censor can classify this
//! software, so the TLS layer negotiates with a browser-shaped ClientHello
//! (see [`crate::obfuscation`]) and the WebSocket upgrade looks like an
//! ordinary browser request apart from two routing headers.

use super::{DialError, TunnelDialer, TunnelHandshakeError};
use crate::obfuscation::{build_tls_config, BrowserProfile, FingerprintConfig};
use crate::Config;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{client_async, WebSocketStream};
use tracing::debug;

/// Request header carrying the CONNECT target `host:port`
pub(crate) const TARGET_HEADER: &str = "x-target";
/// Request header carrying the shared secret
pub(crate) const PASSWORD_HEADER: &str = "x-password";

/// Default bound on connect + TLS + upgrade, per phase
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunnel stream produced by the production dialer
pub type TunnelStream = WebSocketStream<tokio_rustls::client::TlsStream<TcpStream>>;

/// Production dialer: TCP → disguised TLS → WebSocket to the relay
pub struct RelayDialer {
    relay_host: String,
    password: String,
    profile: BrowserProfile,
    handshake_timeout: Duration,
}

impl RelayDialer {
    pub fn new(relay_host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            relay_host: relay_host.into(),
            password: password.into(),
            profile: BrowserProfile::Random,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Build a dialer from the configuration record
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.wss.clone(), config.password.clone())
    }

    /// Use a fixed browser profile instead of a random one per dial
    pub fn with_profile(mut self, profile: BrowserProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Override the handshake deadline
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[async_trait]
impl TunnelDialer for RelayDialer {
    type Transport = tokio_rustls::client::TlsStream<TcpStream>;

    async fn dial(&self, target: &str) -> Result<TunnelStream, DialError> {
        let (host, port) = split_relay_host(&self.relay_host);

        let tcp_stream = timeout(self.handshake_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| DialError::Timeout)?
            .map_err(DialError::Connect)?;
        tcp_stream.set_nodelay(true).ok();

        // A fresh profile per dial when Random is configured; the User-Agent
        // below must agree with the ClientHello shape.
        let profile = self.profile.resolve();
        let tls_config = build_tls_config(&FingerprintConfig::new(profile, host))?;
        let connector = TlsConnector::from(Arc::new(tls_config));

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| DialError::InvalidRelayHost(host.to_string()))?;

        // The deadline bounds the handshake only; once it completes the
        // tunnel carries application I/O unbounded, so quiet keep-alive
        // sessions are never cut off.
        let tls_stream = timeout(
            self.handshake_timeout,
            connector.connect(server_name, tcp_stream),
        )
        .await
        .map_err(|_| DialError::Timeout)?
        .map_err(DialError::Tls)?;

        debug!(relay = %host, ?profile, "TLS handshake with relay complete");

        // IPv6 hosts need brackets back for a well-formed request URI.
        let url = if host.contains(':') {
            format!("wss://[{}]:{}/", host, port)
        } else {
            format!("wss://{}/", self.relay_host)
        };
        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            TARGET_HEADER,
            HeaderValue::from_str(target)
                .map_err(|_| DialError::InvalidHeader(target.to_string()))?,
        );
        headers.insert(
            PASSWORD_HEADER,
            HeaderValue::from_str(&self.password)
                .map_err(|_| DialError::InvalidHeader("password".to_string()))?,
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(profile.user_agent()));

        let (ws_stream, _) = timeout(self.handshake_timeout, client_async(request, tls_stream))
            .await
            .map_err(|_| DialError::Timeout)?
            .map_err(|e| match e {
                WsError::Http(response) => {
                    let status = response.status().as_u16();
                    let body = response
                        .into_body()
                        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                        .unwrap_or_default();
                    DialError::Handshake(TunnelHandshakeError { status, body })
                }
                other => DialError::Upgrade(other),
            })?;

        debug!(relay = %self.relay_host, target = %target, "tunnel stream established");
        Ok(ws_stream)
    }
}

/// Split a configured relay host into SNI host and port, defaulting to 443.
///
/// IPv6 literals use the bracket form for a port (`[::1]:8443`); a bare
/// literal (`::1`) is all host.
fn split_relay_host(relay_host: &str) -> (&str, u16) {
    if let Some(rest) = relay_host.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            if let Some(port) = tail.strip_prefix(':').and_then(|p| p.parse().ok()) {
                return (host, port);
            }
            return (host, 443);
        }
    }
    // More than one colon without brackets is a bare IPv6 literal, not a
    // host:port pair.
    if relay_host.matches(':').count() > 1 {
        return (relay_host, 443);
    }
    match relay_host.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host, port),
            Err(_) => (relay_host, 443),
        },
        None => (relay_host, 443),
    }
}
