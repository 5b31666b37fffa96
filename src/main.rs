//! range-guard: inspecting TCP reverse proxy.
//!
//! Sits in front of a single HTTP backend and terminates connections whose
//! `Range` header asks for an excessive number of byte ranges.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 RANGE GUARD                  │
//!                        │                                              │
//!     Client             │  ┌──────────┐    ┌──────────┐                │
//!     ───────────────────┼─▶│   net    │───▶│ acceptor │── connect ─────┼──▶ Backend
//!                        │  │ listener │    └────┬─────┘                │
//!                        │  └──────────┘         │ spawn per connection │
//!                        │                       ▼                      │
//!                        │              ┌─────────────────┐             │
//!     ◀──────────────────┼──────────────│ connection pipe │◀────────────┼─── Backend
//!                        │              │ buffer + verdict│             │
//!                        │              └────────┬────────┘             │
//!                        │                       │ whole buffer         │
//!                        │                       ▼                      │
//!                        │              ┌─────────────────┐             │
//!                        │              │ range inspector │             │
//!                        │              │  (patterns)     │             │
//!                        │              └─────────────────┘             │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use range_guard::config::{self, ProxyConfig};
use range_guard::inspection::HttpPatterns;
use range_guard::lifecycle::{wait_for_shutdown_signal, Shutdown};
use range_guard::net::Listener;
use range_guard::observability::{logging, metrics};
use range_guard::proxy::{pipe_config, Acceptor};

#[derive(Parser, Debug)]
#[command(name = "range-guard")]
#[command(version, about = "Reverse proxy that blocks HTTP Range header DoS attempts", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `listener.bind_address`.
    #[arg(short, long)]
    listen: Option<String>,

    /// Backend address, overrides `backend.address`.
    #[arg(short, long)]
    backend: Option<String>,
}

impl Cli {
    /// File values, then flag overrides, validated once on the result.
    fn load(&self) -> Result<ProxyConfig, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::read_config(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(backend) = &self.backend {
            config.backend.address = backend.clone();
        }
        config::validate_config(&config).map_err(config::ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability)?;

    tracing::info!("range-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        max_connections = config.listener.max_connections,
        max_buffer_bytes = config.limits.max_buffer_bytes,
        "Configuration loaded"
    );

    let patterns = Arc::new(HttpPatterns::compile()?);

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = Listener::bind(&config.listener).await?;
    let acceptor = Acceptor::new(listener, &config, pipe_config(&config, patterns));

    let shutdown = Shutdown::new();
    let accepting = tokio::spawn(acceptor.run(shutdown.subscribe()));

    wait_for_shutdown_signal().await;
    shutdown.trigger();
    accepting.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
