//! Proxy data path.
//!
//! # Data Flow
//! ```text
//! acceptor.rs: accepted client + connected backend
//!     → pipe.rs (one task per connection)
//!         read peer → buffer.rs (append) → inspector → verdict
//!         Allow  → flush to the other peer (partial writes keep the suffix)
//!         Buffer → keep accumulating
//!         Block  → close both peers
//! ```

pub mod acceptor;
pub mod buffer;
pub mod pipe;

pub use acceptor::{connect_backend, pipe_config, Acceptor};
pub use buffer::{CapacityExceeded, DirectionBuffer};
pub use pipe::{
    ConnectionPipe, Direction, ForwardedBytes, Peer, PipeConfig, PipeError, PipeReport,
    Termination, DEFAULT_MAX_BUFFER_BYTES,
};
