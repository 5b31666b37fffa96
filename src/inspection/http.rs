//! HTTP Range header inspection.
//!
//! # Responsibilities
//! - Decide whether an accumulated header block is complete
//! - Recognise HTTP traffic by its version token
//! - Count byte-range units in the `Range` header and reject excessive counts
//!
//! # Design Decisions
//! - Always re-scans the whole buffer; no state is kept between calls
//! - Non-HTTP traffic is allowed through untouched
//! - Every `Range` and `Request-Range` header line in the buffer contributes to
//!   the count, since servers merge repeated headers

use std::sync::Arc;

use crate::inspection::patterns::HttpPatterns;
use crate::inspection::verdict::{BlockReason, Verdict};

/// Maximum number of byte-range units accepted in a request.
pub const MAX_RANGES: usize = 50;

/// Maps one direction's accumulated bytes to a verdict.
///
/// Implementations must be pure: the same bytes always produce the same
/// verdict. Any `Fn(&[u8]) -> Verdict` closure is an inspector.
pub trait Inspector: Send + Sync {
    fn inspect(&self, data: &[u8]) -> Verdict;
}

impl<F> Inspector for F
where
    F: Fn(&[u8]) -> Verdict + Send + Sync,
{
    fn inspect(&self, data: &[u8]) -> Verdict {
        self(data)
    }
}

/// Detects the "Apache killer" Range header denial of service.
#[derive(Debug, Clone)]
pub struct RangeInspector {
    patterns: Arc<HttpPatterns>,
    max_ranges: usize,
}

impl RangeInspector {
    pub fn new(patterns: Arc<HttpPatterns>) -> Self {
        Self {
            patterns,
            max_ranges: MAX_RANGES,
        }
    }

    /// Total range units across all `Range` headers, or `None` if there are none.
    pub fn range_count(&self, data: &[u8]) -> Option<usize> {
        let mut values = self.patterns.range_header().capture_all(data, 1).peekable();
        values.peek()?;

        let token = self.patterns.range_token();
        Some(values.map(|value| token.count_matches(value)).sum())
    }
}

impl Inspector for RangeInspector {
    fn inspect(&self, data: &[u8]) -> Verdict {
        if !self.patterns.full_message().matches(data) {
            return Verdict::Buffer;
        }

        if !self.patterns.http_version().matches(data) {
            return Verdict::Allow;
        }

        let Some(count) = self.range_count(data) else {
            return Verdict::Allow;
        };

        tracing::debug!(
            pattern = self.patterns.range_token().name(),
            range_count = count,
            limit = self.max_ranges,
            "Range header evaluated"
        );

        if count > self.max_ranges {
            Verdict::Block(BlockReason::ExcessiveRanges {
                count,
                limit: self.max_ranges,
            })
        } else {
            Verdict::Allow
        }
    }
}
