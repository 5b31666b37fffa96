//! Inspection verdicts.

use std::fmt;

/// Why a direction's data was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// The `Range` header carried more byte-range units than allowed.
    ExcessiveRanges {
        /// Number of range units counted in the header value.
        count: usize,
        /// Maximum number of range units accepted.
        limit: usize,
    },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::ExcessiveRanges { count, limit } => {
                write!(f, "range header has {} ranges (limit {})", count, limit)
            }
        }
    }
}

/// Decision for one direction's pending bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    /// Forward the buffered bytes.
    #[default]
    Allow,
    /// Message incomplete; keep accumulating and do not forward yet.
    Buffer,
    /// Terminate the connection without forwarding.
    Block(BlockReason),
}

impl Verdict {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Buffer => "buffer",
            Verdict::Block(_) => "block",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block(_))
    }
}
