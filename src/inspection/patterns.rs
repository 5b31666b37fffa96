//! The HTTP pattern set used by the Range inspector.
//!
//! All patterns run in byte mode (`(?-u)`), so they never reject or skip
//! non-UTF-8 input.

use crate::inspection::matcher::{PatternError, PatternMatcher};

/// Header block terminator at the very end of the buffer.
pub const FULL_HTTP_MESSAGE: &str = r"(?-u)\r\n\r\n\z";

/// `HTTP/<digits>.<digits>` followed by a non-digit.
pub const HTTP_VERSION_TOKEN: &str = r"(?-u)HTTP/[0-9]+\.[0-9]+[^0-9]";

/// Value of a `Range` or legacy `Request-Range` header line, up to (not
/// including) the next CR.
///
/// Servers honour `Request-Range` as an alias, so both names count. Anchored to
/// the start of a line so `If-Range` and `Content-Range` are not mistaken for
/// it. Header names are case-insensitive.
pub const RANGE_HEADER_VALUE: &str = r"(?mi-u)^(?:Request-)?Range:([^\r]*)\r";

/// One range unit: optional comma, optional digits, hyphen, optional digits.
pub const RANGE_TOKEN: &str = r"(?-u),?[0-9]*-[0-9]*";

/// Compiled HTTP patterns, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct HttpPatterns {
    full_message: PatternMatcher,
    http_version: PatternMatcher,
    range_header: PatternMatcher,
    range_token: PatternMatcher,
}

impl HttpPatterns {
    /// Compile every pattern. Fails on the first pattern that does not compile.
    pub fn compile() -> Result<Self, PatternError> {
        Ok(Self {
            full_message: PatternMatcher::new("full_http_message", FULL_HTTP_MESSAGE)?,
            http_version: PatternMatcher::new("http_version_token", HTTP_VERSION_TOKEN)?,
            range_header: PatternMatcher::new("range_header_value", RANGE_HEADER_VALUE)?,
            range_token: PatternMatcher::new("range_token", RANGE_TOKEN)?,
        })
    }

    pub fn full_message(&self) -> &PatternMatcher {
        &self.full_message
    }

    pub fn http_version(&self) -> &PatternMatcher {
        &self.http_version
    }

    pub fn range_header(&self) -> &PatternMatcher {
        &self.range_header
    }

    pub fn range_token(&self) -> &PatternMatcher {
        &self.range_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> HttpPatterns {
        HttpPatterns::compile().expect("patterns should compile")
    }

    #[test]
    fn full_message_requires_terminator_at_end() {
        let p = patterns();
        assert!(p.full_message().matches(b"GET / HTTP/1.1\r\n\r\n"));
        assert!(!p.full_message().matches(b"GET / HTTP/1.1\r\n"));
        assert!(!p.full_message().matches(b"GET / HTTP/1.1\r\n\r\nbody"));
    }

    #[test]
    fn http_version_needs_trailing_non_digit() {
        let p = patterns();
        assert!(p.http_version().matches(b"GET / HTTP/1.1\r\n"));
        assert!(p.http_version().matches(b"HTTP/10.25 "));
        assert!(!p.http_version().matches(b"HTTP/1.1"));
        assert!(!p.http_version().matches(b"HTTP/x.y\r\n"));
    }

    #[test]
    fn range_header_captures_value_up_to_cr() {
        let p = patterns();
        let msg = b"GET / HTTP/1.1\r\nRange: bytes=0-1,2-3\r\nHost: x\r\n\r\n";
        assert_eq!(
            p.range_header().capture_first(msg, 1),
            Some(&b" bytes=0-1,2-3"[..])
        );
    }

    #[test]
    fn request_range_alias_is_captured() {
        let p = patterns();
        let msg = b"GET / HTTP/1.1\r\nRequest-Range: bytes=0-1,2-3\r\n\r\n";
        assert_eq!(
            p.range_header().capture_first(msg, 1),
            Some(&b" bytes=0-1,2-3"[..])
        );

        let msg = b"GET / HTTP/1.1\r\nrequest-range: bytes=7-\r\n\r\n";
        assert_eq!(p.range_header().capture_first(msg, 1), Some(&b" bytes=7-"[..]));
    }

    #[test]
    fn range_header_ignores_conditional_and_response_headers() {
        let p = patterns();
        let msg = b"GET / HTTP/1.1\r\nIf-Range: \"a-b-c\"\r\n\r\n";
        assert_eq!(p.range_header().capture_first(msg, 1), None);

        let msg = b"HTTP/1.1 206 Partial\r\nContent-Range: bytes 0-1/2\r\n\r\n";
        assert_eq!(p.range_header().capture_first(msg, 1), None);
    }

    #[test]
    fn range_header_is_case_insensitive() {
        let p = patterns();
        let msg = b"GET / HTTP/1.1\r\nrange: bytes=5-\r\n\r\n";
        assert_eq!(p.range_header().capture_first(msg, 1), Some(&b" bytes=5-"[..]));
    }

    #[test]
    fn range_token_counts_units() {
        let p = patterns();
        assert_eq!(p.range_token().count_matches(b" bytes=0-1,2-3,4-5"), 3);
        assert_eq!(p.range_token().count_matches(b" bytes=-500"), 1);
        assert_eq!(p.range_token().count_matches(b" bytes=9500-"), 1);
        assert_eq!(p.range_token().count_matches(b" bytes=0-0,-1"), 2);
        assert_eq!(p.range_token().count_matches(b" none"), 0);
    }
}
