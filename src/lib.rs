//! # Ghostbridge
//!
//! A covert tunneling relay: a local HTTP CONNECT gateway that forwards
//! arbitrary TCP traffic to a remote relay over an encrypted WebSocket,
//! disguising the outbound TLS handshake to resemble ordinary browser
//! traffic.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Lifecycle Controller                  │
//! │          (start/stop, stop signal ownership)          │
//! ├──────────────────────────────────────────────────────┤
//! │                   CONNECT Gateway                     │
//! │     (accept loop, request parsing, session spawn)     │
//! ├──────────────────────────────────────────────────────┤
//! │                    Duplex Pump                        │
//! │      (chunked bidirectional byte/frame relaying)      │
//! ├──────────────────────────────────────────────────────┤
//! │             Fingerprinted Transport Dialer            │
//! │      (TCP → disguised TLS → WebSocket handshake)      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Each accepted proxy client becomes one isolated session: the gateway
//! hijacks the socket after the CONNECT exchange, the dialer establishes a
//! TLS-secured WebSocket to the relay carrying the target host and shared
//! secret in handshake headers, and the pump relays bytes both ways until
//! either side fails. Sessions share no state with each other; the only
//! process-wide mutable resource is the controller's stop signal.

pub mod config;
pub mod gateway;
pub mod obfuscation;
pub mod service;
pub mod transport;
pub mod tunnel;

pub use config::Config;
pub use service::TunnelService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("relay dial error: {0}")]
    Dial(#[from] transport::DialError),

    #[error("failed to bind listener: {0}")]
    Listen(std::io::Error),

    #[error("service is already running")]
    AlreadyRunning,
}
