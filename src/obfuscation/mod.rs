//! Handshake obfuscation
//!
//! The outbound TLS handshake to the relay is the only part of a session a
//! passive observer can classify, so its ClientHello is shaped to match a
//! common browser rather than the platform default TLS stack.

mod fingerprint;

pub use fingerprint::{build_tls_config, BrowserProfile, FingerprintConfig, FingerprintError};
