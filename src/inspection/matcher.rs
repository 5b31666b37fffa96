//! Compiled pattern primitives over raw bytes.
//!
//! # Responsibilities
//! - Compile a fixed pattern once
//! - Boolean match, first-match capture extraction, non-overlapping match count
//!
//! # Design Decisions
//! - Operates on `&[u8]` (`regex::bytes`), so non-UTF-8 traffic is inspected as-is
//! - Immutable after construction; `Send + Sync` for sharing across connections

use regex::bytes::Regex;

/// Errors raised while compiling a pattern.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("failed to compile pattern '{name}': {source}")]
    Compile {
        name: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// A named, compiled pattern.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    name: &'static str,
    regex: Regex,
}

impl PatternMatcher {
    /// Compile `pattern`. `name` is used in errors and logs.
    pub fn new(name: &'static str, pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern).map_err(|source| PatternError::Compile { name, source })?;
        Ok(Self { name, regex })
    }

    /// Pattern identifier.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if the pattern matches anywhere in `subject`.
    pub fn matches(&self, subject: &[u8]) -> bool {
        self.regex.is_match(subject)
    }

    /// Returns the bytes of capture group `group` from the first match.
    ///
    /// `None` if there is no match, or the group did not participate in it.
    pub fn capture_first<'s>(&self, subject: &'s [u8], group: usize) -> Option<&'s [u8]> {
        self.regex
            .captures(subject)
            .and_then(|caps| caps.get(group))
            .map(|m| m.as_bytes())
    }

    /// Capture group `group` of every non-overlapping match, in order.
    pub fn capture_all<'a>(
        &'a self,
        subject: &'a [u8],
        group: usize,
    ) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.regex
            .captures_iter(subject)
            .filter_map(move |caps| caps.get(group).map(|m| m.as_bytes()))
    }

    /// Counts non-overlapping matches across `subject`.
    ///
    /// Scanning resumes at the end of each match; after an empty match it
    /// resumes one byte further, so the scan always terminates.
    pub fn count_matches(&self, subject: &[u8]) -> usize {
        let mut count = 0;
        let mut pos = 0;

        while pos <= subject.len() {
            let Some(m) = self.regex.find_at(subject, pos) else {
                break;
            };
            count += 1;
            pos = if m.start() == m.end() { m.end() + 1 } else { m.end() };
        }

        count
    }
}
