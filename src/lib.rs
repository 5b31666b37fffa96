//! Inspecting TCP reverse proxy that blocks HTTP Range header DoS attempts.

pub mod config;
pub mod inspection;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use config::schema::ProxyConfig;
pub use inspection::{HttpPatterns, Inspector, RangeInspector, Verdict};
pub use lifecycle::Shutdown;
pub use proxy::{Acceptor, ConnectionPipe, PipeConfig};
