//! HTTP inspection subsystem.
//!
//! # Data Flow
//! ```text
//! Accumulated direction buffer (bytes)
//!     → http.rs (RangeInspector: completeness, HTTP check, Range header)
//!     → patterns.rs (the four compiled HTTP patterns)
//!     → matcher.rs (match / capture / count primitives)
//!     → verdict.rs (Allow | Buffer | Block(reason))
//!     → Returned to the connection pipe
//! ```
//!
//! # Design Decisions
//! - Inspection is a pure function of the buffer contents; the pipe owns all state
//! - Patterns are compiled once at startup and shared read-only via Arc
//! - The range threshold is a constant, not configuration

pub mod http;
pub mod matcher;
pub mod patterns;
pub mod verdict;

pub use http::{Inspector, RangeInspector, MAX_RANGES};
pub use matcher::{PatternError, PatternMatcher};
pub use patterns::HttpPatterns;
pub use verdict::{BlockReason, Verdict};
