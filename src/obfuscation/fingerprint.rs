//! TLS ClientHello fingerprint disguise
//!
//! Passive classifiers (JA3/JA4) identify tunneling software by the shape of
//! its ClientHello: cipher suite order, ALPN list, extension layout. This
//! module builds a rustls `ClientConfig` whose negotiable parameters track a
//! real browser profile instead of the rustls defaults, and supports picking
//! a fresh random profile per connection so repeated dials do not present a
//! single stable fingerprint.
//!
//! rustls does not expose full ClientHello construction, so this is the best
//! approximation available within its configuration surface.

use rand::Rng;
use rustls::crypto::ring as ring_provider;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite};
use std::sync::Arc;

/// Browser fingerprint profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowserProfile {
    /// Chrome 120+ on desktop
    Chrome,
    /// Firefox 121+ on desktop
    Firefox,
    /// Safari 17+ on macOS
    Safari,
    /// Fresh random pick per config build
    #[default]
    Random,
}

impl BrowserProfile {
    /// Pick a concrete profile at random
    pub fn random() -> Self {
        match rand::thread_rng().gen_range(0..3) {
            0 => Self::Chrome,
            1 => Self::Firefox,
            _ => Self::Safari,
        }
    }

    /// Resolve `Random` into a concrete profile
    pub fn resolve(self) -> Self {
        match self {
            Self::Random => Self::random(),
            p => p,
        }
    }

    /// User-Agent string consistent with this profile's TLS shape
    pub fn user_agent(&self) -> &'static str {
        match self {
            Self::Chrome => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            }
            Self::Firefox => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0"
            }
            Self::Safari => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15"
            }
            Self::Random => Self::random().user_agent(),
        }
    }

    /// ALPN protocol list in the order the browser advertises it
    pub fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        // All three profiles advertise h2 then http/1.1; kept per-profile so
        // a divergent profile can be added without touching callers.
        match self {
            Self::Chrome | Self::Firefox | Self::Safari => {
                vec![b"h2".to_vec(), b"http/1.1".to_vec()]
            }
            Self::Random => Self::random().alpn_protocols(),
        }
    }
}

impl std::str::FromStr for BrowserProfile {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chrome" => Ok(Self::Chrome),
            "firefox" => Ok(Self::Firefox),
            "safari" => Ok(Self::Safari),
            "random" => Ok(Self::Random),
            other => Err(FingerprintError::UnknownProfile(other.to_string())),
        }
    }
}

/// TLS fingerprint configuration
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    /// Browser profile to present
    pub profile: BrowserProfile,
    /// Server Name Indication sent in the ClientHello
    pub sni: String,
}

impl FingerprintConfig {
    pub fn new(profile: BrowserProfile, sni: impl Into<String>) -> Self {
        Self {
            profile,
            sni: sni.into(),
        }
    }
}

/// Fingerprint-related errors
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("TLS configuration error: {0}")]
    Config(String),

    #[error("unknown browser profile: {0}")]
    UnknownProfile(String),
}

/// Build a rustls `ClientConfig` presenting the given browser fingerprint.
///
/// `Random` resolves here, so each call may yield a differently-shaped
/// ClientHello.
pub fn build_tls_config(config: &FingerprintConfig) -> Result<ClientConfig, FingerprintError> {
    let profile = config.profile.resolve();

    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let crypto_provider = CryptoProvider {
        cipher_suites: cipher_suites_for(profile),
        ..ring_provider::default_provider()
    };

    let mut tls_config = ClientConfig::builder_with_provider(Arc::new(crypto_provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| FingerprintError::Config(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    tls_config.alpn_protocols = profile.alpn_protocols();

    // Browsers resume sessions; a client that never does stands out.
    tls_config.resumption = rustls::client::Resumption::default();

    Ok(tls_config)
}

/// Cipher suites ordered to match the browser profile
fn cipher_suites_for(profile: BrowserProfile) -> Vec<SupportedCipherSuite> {
    use rustls::crypto::ring::cipher_suite;

    match profile {
        BrowserProfile::Chrome => vec![
            // TLS 1.3 first, then 1.2
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ],
        BrowserProfile::Firefox => vec![
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        ],
        BrowserProfile::Safari => vec![
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ],
        BrowserProfile::Random => cipher_suites_for(BrowserProfile::random()),
    }
}
