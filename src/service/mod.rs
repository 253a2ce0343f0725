//! Session lifecycle controller
//!
//! Owns the listening socket's life span and the one process-wide stop
//! signal. `start` validates configuration, binds, and returns immediately;
//! serving happens in the background until `stop` fires the signal.
//!
//! The stop signal transitions once, from "not fired" to "fired", and is
//! observed by the accept loop alone; in-flight sessions are never
//! force-closed, they wind down on their own I/O errors.

use crate::gateway::ConnectGateway;
use crate::transport::{RelayDialer, TunnelDialer};
use crate::{Config, Error};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

struct ServiceHandle {
    shutdown: watch::Sender<bool>,
    local_addr: SocketAddr,
}

/// Starts and stops the CONNECT gateway
#[derive(Default)]
pub struct TunnelService {
    handle: Option<ServiceHandle>,
}

impl TunnelService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start serving with the production relay dialer built from `config`.
    pub async fn start(&mut self, config: &Config) -> crate::Result<()> {
        let dialer = Arc::new(RelayDialer::from_config(config));
        self.start_with_dialer(config, dialer).await
    }

    /// Start serving with an explicit dialer (tests inject a stub here).
    ///
    /// Validation runs before anything is bound, so a bad chunk size or
    /// port never leaves a listener behind. Returns as soon as the accept
    /// loop is spawned.
    pub async fn start_with_dialer<D: TunnelDialer>(
        &mut self,
        config: &Config,
        dialer: Arc<D>,
    ) -> crate::Result<()> {
        config.validate()?;

        if self.handle.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let gateway = ConnectGateway::bind((Ipv4Addr::UNSPECIFIED, config.port))
            .await
            .map_err(Error::Listen)?;
        let local_addr = gateway.local_addr().map_err(Error::Listen)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(port = config.port, "HTTP CONNECT gateway listening");

        tokio::spawn(gateway.run(dialer, config.chunk_bytes(), shutdown_rx));

        self.handle = Some(ServiceHandle {
            shutdown: shutdown_tx,
            local_addr,
        });
        Ok(())
    }

    /// Fire the stop signal.
    ///
    /// Idempotent: a no-op when never started or already stopped. New
    /// connections stop being accepted; tunneling sessions keep draining.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.shutdown.send(true);
            info!("gateway stopped; in-flight sessions drain on their own");
        }
    }

    /// Whether a listener is currently serving
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.as_ref().map(|h| h.local_addr)
    }
}
