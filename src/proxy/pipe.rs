//! Bidirectional connection pipe with in-flight inspection.
//!
//! # Responsibilities
//! - Own both peer streams and one pending buffer per direction
//! - Re-run the direction's inspector over the whole buffer after every read
//! - Forward only approved bytes, retaining the unsent suffix of partial writes
//! - End the session on peer close, I/O failure, Block, or idle timeout
//!
//! # State Machine (per direction)
//! ```text
//!         read + inspect
//!   Allow ───────────────▶ Buffer ──┐
//!     ▲  ◀───────────────   │       │ buffer full
//!     │   read + inspect    │       ▼
//!     │                     │   CapacityExceeded (fatal)
//!     └──── Block ◀─────────┘
//!           (terminal: both peers closed, nothing more forwarded)
//! ```
//!
//! Each loop iteration waits on, in priority order: flush client→backend,
//! flush backend→client, read client, read backend, idle timer.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::inspection::{BlockReason, Inspector, Verdict};
use crate::observability::metrics;
use crate::proxy::buffer::DirectionBuffer;

/// Default per-direction buffer limit.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1_000_000;

/// Upper bound on a single read.
const READ_CHUNK: usize = 16 * 1024;

/// One end of the proxied session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    Client,
    Backend,
}

impl Peer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Peer::Client => "client",
            Peer::Backend => "backend",
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow of bytes between the two peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    pub fn source(&self) -> Peer {
        match self {
            Direction::ClientToBackend => Peer::Client,
            Direction::BackendToClient => Peer::Backend,
        }
    }

    pub fn destination(&self) -> Peer {
        match self {
            Direction::ClientToBackend => Peer::Backend,
            Direction::BackendToClient => Peer::Client,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client_to_backend",
            Direction::BackendToClient => "backend_to_client",
        }
    }
}

/// Fatal, connection-scoped failures.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// Hard send or receive failure on one peer.
    #[error("{peer} I/O error: {source}")]
    Io {
        peer: Peer,
        #[source]
        source: io::Error,
    },

    /// A direction filled its buffer while still waiting for a complete message.
    #[error("data from {peer} exceeded the {limit} byte buffer before a verdict was reached")]
    CapacityExceeded { peer: Peer, limit: usize },
}

impl PipeError {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PipeError::Io { .. } => "io_error",
            PipeError::CapacityExceeded { .. } => "capacity_exceeded",
        }
    }
}

/// Why a session ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The peer closed its side of the connection.
    PeerClosed(Peer),
    /// An inspector rejected data from `peer`.
    Blocked { peer: Peer, reason: BlockReason },
    /// Neither peer made progress within the idle timeout.
    IdleTimeout,
}

impl Termination {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Termination::PeerClosed(_) => "peer_closed",
            Termination::Blocked { .. } => "blocked",
            Termination::IdleTimeout => "idle_timeout",
        }
    }
}

/// Bytes handed to the transport, per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardedBytes {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

impl ForwardedBytes {
    fn add(&mut self, direction: Direction, n: usize) {
        match direction {
            Direction::ClientToBackend => self.client_to_backend += n as u64,
            Direction::BackendToClient => self.backend_to_client += n as u64,
        }
    }
}

/// Outcome of a session that ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeReport {
    pub termination: Termination,
    pub forwarded: ForwardedBytes,
}

/// Per-connection pipe settings, injected when the pipe is created.
#[derive(Clone)]
pub struct PipeConfig {
    /// Limit for each direction's pending buffer.
    pub max_buffer_bytes: usize,
    /// End the session after this long without progress. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// Inspector for data from the client. `None` forwards as-is.
    pub client_inspector: Option<Arc<dyn Inspector>>,
    /// Inspector for data from the backend. `None` forwards as-is.
    pub backend_inspector: Option<Arc<dyn Inspector>>,
}

impl PipeConfig {
    pub fn with_client_inspector(mut self, inspector: Arc<dyn Inspector>) -> Self {
        self.client_inspector = Some(inspector);
        self
    }

    pub fn with_backend_inspector(mut self, inspector: Arc<dyn Inspector>) -> Self {
        self.backend_inspector = Some(inspector);
        self
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            idle_timeout: None,
            client_inspector: None,
            backend_inspector: None,
        }
    }
}

impl fmt::Debug for PipeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeConfig")
            .field("max_buffer_bytes", &self.max_buffer_bytes)
            .field("idle_timeout", &self.idle_timeout)
            .field("client_inspector", &self.client_inspector.is_some())
            .field("backend_inspector", &self.backend_inspector.is_some())
            .finish()
    }
}

/// A proxied session between one client and the backend.
pub struct ConnectionPipe<C, B> {
    client: C,
    backend: B,
    config: PipeConfig,
}

enum Event {
    Flushed(Direction, io::Result<usize>),
    Received(Peer, io::Result<usize>),
    Idle,
}

impl<C, B> ConnectionPipe<C, B>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    B: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(client: C, backend: B, config: PipeConfig) -> Self {
        Self {
            client,
            backend,
            config,
        }
    }

    /// Drive the session to completion. Both peers are closed on return.
    pub async fn run(self) -> Result<PipeReport, PipeError> {
        let (mut client_rd, mut client_wr) = split(self.client);
        let (mut backend_rd, mut backend_wr) = split(self.backend);
        let mut session = Session::new(self.config);

        let result = session
            .pump(&mut client_rd, &mut client_wr, &mut backend_rd, &mut backend_wr)
            .await;

        if let Ok(Termination::PeerClosed(_)) = result {
            session.drain(&mut client_wr, &mut backend_wr).await;
        }

        let _ = client_wr.shutdown().await;
        let _ = backend_wr.shutdown().await;

        match &result {
            Ok(Termination::PeerClosed(peer)) => {
                tracing::debug!(peer = %peer, "Connection closed by peer");
            }
            Ok(Termination::Blocked { .. }) => {}
            Ok(Termination::IdleTimeout) => {
                tracing::info!("Connection idle timeout");
            }
            Err(PipeError::CapacityExceeded { peer, limit }) => {
                tracing::warn!(peer = %peer, limit = limit, "Buffer limit exceeded before a verdict");
            }
            Err(e @ PipeError::Io { .. }) => {
                tracing::warn!(error = %e, "Connection failed");
            }
        }
        metrics::record_termination(match &result {
            Ok(termination) => termination.label(),
            Err(e) => e.label(),
        });

        result.map(|termination| PipeReport {
            termination,
            forwarded: session.forwarded,
        })
    }
}

/// Mutable per-session state: buffers, inspectors and counters.
struct Session {
    from_client: DirectionBuffer,
    from_backend: DirectionBuffer,
    client_inspector: Option<Arc<dyn Inspector>>,
    backend_inspector: Option<Arc<dyn Inspector>>,
    idle_timeout: Option<Duration>,
    forwarded: ForwardedBytes,
}

impl Session {
    fn new(config: PipeConfig) -> Self {
        Self {
            from_client: DirectionBuffer::new(config.max_buffer_bytes),
            from_backend: DirectionBuffer::new(config.max_buffer_bytes),
            client_inspector: config.client_inspector,
            backend_inspector: config.backend_inspector,
            idle_timeout: config.idle_timeout,
            forwarded: ForwardedBytes::default(),
        }
    }

    fn buffer_mut(&mut self, peer: Peer) -> &mut DirectionBuffer {
        match peer {
            Peer::Client => &mut self.from_client,
            Peer::Backend => &mut self.from_backend,
        }
    }

    async fn pump<C, B>(
        &mut self,
        client_rd: &mut ReadHalf<C>,
        client_wr: &mut WriteHalf<C>,
        backend_rd: &mut ReadHalf<B>,
        backend_wr: &mut WriteHalf<B>,
    ) -> Result<Termination, PipeError>
    where
        C: AsyncRead + AsyncWrite,
        B: AsyncRead + AsyncWrite,
    {
        let mut client_chunk = vec![0u8; READ_CHUNK];
        let mut backend_chunk = vec![0u8; READ_CHUNK];

        loop {
            for peer in [Peer::Client, Peer::Backend] {
                let buffer = self.buffer_mut(peer);
                if buffer.is_full() && buffer.verdict() == Verdict::Buffer {
                    return Err(PipeError::CapacityExceeded {
                        peer,
                        limit: buffer.limit(),
                    });
                }
            }

            // An Allow-ed full buffer stops reading until the flush frees room.
            let client_room = self.from_client.remaining().min(READ_CHUNK);
            let backend_room = self.from_backend.remaining().min(READ_CHUNK);
            let idle_timeout = self.idle_timeout;
            let idle = async move {
                match idle_timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let event = tokio::select! {
                biased;
                res = backend_wr.write(self.from_client.pending()), if self.from_client.ready_to_flush() => {
                    Event::Flushed(Direction::ClientToBackend, res)
                }
                res = client_wr.write(self.from_backend.pending()), if self.from_backend.ready_to_flush() => {
                    Event::Flushed(Direction::BackendToClient, res)
                }
                res = client_rd.read(&mut client_chunk[..client_room]), if client_room > 0 => {
                    Event::Received(Peer::Client, res)
                }
                res = backend_rd.read(&mut backend_chunk[..backend_room]), if backend_room > 0 => {
                    Event::Received(Peer::Backend, res)
                }
                _ = idle => Event::Idle,
            };

            match event {
                Event::Flushed(direction, res) => {
                    let destination = direction.destination();
                    let sent = res.map_err(|source| PipeError::Io {
                        peer: destination,
                        source,
                    })?;
                    if sent == 0 {
                        return Err(PipeError::Io {
                            peer: destination,
                            source: io::ErrorKind::WriteZero.into(),
                        });
                    }
                    self.buffer_mut(direction.source()).consume(sent);
                    self.forwarded.add(direction, sent);
                    metrics::record_forwarded(direction, sent);
                }
                Event::Received(peer, res) => {
                    let received = res.map_err(|source| PipeError::Io { peer, source })?;
                    if received == 0 {
                        return Ok(Termination::PeerClosed(peer));
                    }
                    let chunk = match peer {
                        Peer::Client => &client_chunk[..received],
                        Peer::Backend => &backend_chunk[..received],
                    };
                    if let Some(termination) = self.receive(peer, chunk)? {
                        return Ok(termination);
                    }
                }
                Event::Idle => return Ok(Termination::IdleTimeout),
            }
        }
    }

    /// Append freshly received bytes and re-inspect the whole buffer.
    fn receive(&mut self, peer: Peer, data: &[u8]) -> Result<Option<Termination>, PipeError> {
        let (buffer, inspector) = match peer {
            Peer::Client => (&mut self.from_client, &self.client_inspector),
            Peer::Backend => (&mut self.from_backend, &self.backend_inspector),
        };

        buffer
            .append(data)
            .map_err(|e| PipeError::CapacityExceeded { peer, limit: e.limit })?;

        let Some(inspector) = inspector else {
            return Ok(None);
        };

        let verdict = inspector.inspect(buffer.pending());
        buffer.set_verdict(verdict);
        metrics::record_verdict(peer, verdict);

        match verdict {
            Verdict::Allow => Ok(None),
            Verdict::Buffer => {
                tracing::info!(peer = %peer, buffered = buffer.len(), "data from {} buffered", peer);
                Ok(None)
            }
            Verdict::Block(reason) => {
                tracing::warn!(peer = %peer, reason = %reason, "data from {} rejected", peer);
                Ok(Some(Termination::Blocked { peer, reason }))
            }
        }
    }

    /// Best-effort write of already approved bytes after an orderly close.
    async fn drain<C, B>(&mut self, client_wr: &mut WriteHalf<C>, backend_wr: &mut WriteHalf<B>)
    where
        C: AsyncRead + AsyncWrite,
        B: AsyncRead + AsyncWrite,
    {
        let idle_timeout = self.idle_timeout;
        let drain = async {
            if self.from_client.ready_to_flush() {
                let pending = self.from_client.len();
                match backend_wr.write_all(self.from_client.pending()).await {
                    Ok(()) => {
                        self.from_client.consume(pending);
                        self.forwarded.add(Direction::ClientToBackend, pending);
                        metrics::record_forwarded(Direction::ClientToBackend, pending);
                    }
                    Err(e) => tracing::debug!(error = %e, "Final flush to backend failed"),
                }
            }
            if self.from_backend.ready_to_flush() {
                let pending = self.from_backend.len();
                match client_wr.write_all(self.from_backend.pending()).await {
                    Ok(()) => {
                        self.from_backend.consume(pending);
                        self.forwarded.add(Direction::BackendToClient, pending);
                        metrics::record_forwarded(Direction::BackendToClient, pending);
                    }
                    Err(e) => tracing::debug!(error = %e, "Final flush to client failed"),
                }
            }
        };

        match idle_timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, drain).await.is_err() {
                    tracing::debug!("Final flush timed out");
                }
            }
            None => drain.await,
        }
    }
}
