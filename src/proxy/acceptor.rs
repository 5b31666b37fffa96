//! Accept loop and per-connection task spawning.
//!
//! # Responsibilities
//! - Accept clients from the bounded listener
//! - Connect each client to the fixed backend
//! - Spawn one task per connection running a [`ConnectionPipe`]
//! - Stop accepting on shutdown and drain live sessions
//!
//! # Design Decisions
//! - Connection failures stay inside their task; only logs observe them
//! - Inspectors are handed to every pipe at spawn time, no globals

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::inspection::{HttpPatterns, Inspector, RangeInspector};
use crate::net::{ConnectionPermit, ConnectionTracker, Listener};
use crate::observability::metrics;
use crate::proxy::pipe::{ConnectionPipe, PipeConfig};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Build the per-connection pipe settings from configuration.
pub fn pipe_config(config: &ProxyConfig, patterns: Arc<HttpPatterns>) -> PipeConfig {
    let inspector: Arc<dyn Inspector> = Arc::new(RangeInspector::new(patterns));

    let mut pipe = PipeConfig {
        max_buffer_bytes: config.limits.max_buffer_bytes,
        idle_timeout: config.timeouts.idle(),
        ..PipeConfig::default()
    };
    if config.inspection.requests {
        pipe = pipe.with_client_inspector(Arc::clone(&inspector));
    }
    if config.inspection.responses {
        pipe = pipe.with_backend_inspector(inspector);
    }
    pipe
}

/// Accepts clients and proxies each one to the backend.
pub struct Acceptor {
    listener: Listener,
    backend_address: Arc<str>,
    connect_timeout: Duration,
    shutdown_grace: Duration,
    pipe_config: PipeConfig,
    tracker: ConnectionTracker,
}

impl Acceptor {
    pub fn new(listener: Listener, config: &ProxyConfig, pipe_config: PipeConfig) -> Self {
        Self {
            listener,
            backend_address: Arc::from(config.backend.address.as_str()),
            connect_timeout: config.timeouts.connect(),
            shutdown_grace: config.timeouts.shutdown_grace(),
            pipe_config,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept until shutdown, then wait up to the grace period for live sessions.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            backend = %self.backend_address,
            max_connections = self.listener.max_connections(),
            client_inspection = self.pipe_config.client_inspector.is_some(),
            backend_inspection = self.pipe_config.backend_inspector.is_some(),
            "Proxy accepting connections"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr, permit)) => self.spawn_connection(stream, addr, permit),
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        let live = self.tracker.active_count();
        if live > 0 {
            tracing::info!(
                live_connections = live,
                grace_secs = self.shutdown_grace.as_secs(),
                "Draining connections"
            );
            if tokio::time::timeout(self.shutdown_grace, self.tracker.wait_until_idle())
                .await
                .is_err()
            {
                tracing::warn!(
                    live_connections = self.tracker.active_count(),
                    "Grace period elapsed with connections still open"
                );
            }
        }
    }

    fn spawn_connection(&self, client: TcpStream, client_addr: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let span = tracing::info_span!("connection", id = %guard.id(), client = %client_addr);
        let backend_address = Arc::clone(&self.backend_address);
        let connect_timeout = self.connect_timeout;
        let pipe_config = self.pipe_config.clone();

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                metrics::record_connection_opened();
                proxy_connection(client, &backend_address, connect_timeout, pipe_config).await;
                metrics::record_connection_closed();
            }
            .instrument(span),
        );
    }
}

/// Connect to the backend and run the pipe for one client.
async fn proxy_connection(
    client: TcpStream,
    backend_address: &str,
    connect_timeout: Duration,
    pipe_config: PipeConfig,
) {
    let backend = match connect_backend(backend_address, connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(backend = %backend_address, error = %e, "Backend unreachable, closing client");
            metrics::record_termination("backend_unreachable");
            return;
        }
    };

    if let Err(e) = client.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY on client socket");
    }

    tracing::debug!(backend = %backend_address, "Backend connected");

    // Failures are logged by the pipe itself.
    if let Ok(report) = ConnectionPipe::new(client, backend, pipe_config).run().await {
        tracing::debug!(
            termination = ?report.termination,
            client_to_backend = report.forwarded.client_to_backend,
            backend_to_client = report.forwarded.backend_to_client,
            "Connection finished"
        );
    }
}

/// Open a backend connection within `timeout`.
pub async fn connect_backend(address: &str, timeout: Duration) -> std::io::Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {} timed out after {:?}", address, timeout),
            )
        })??;
    stream.set_nodelay(true)?;
    Ok(stream)
}
