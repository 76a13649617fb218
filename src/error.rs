//! Closed error taxonomy shared by every component of the runtime.

use std::fmt;

/// The closed set of ways a runtime operation can fail.
///
/// Every public fallible function returns a [`CanonicalError`] built from one
/// of these kinds. New kinds are never added outside this table — callers
/// are expected to match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedToolCall,
    IncompleteJson,
    Network,
    Auth,
    RateLimit,
    Cancelled,
    Timeout,
    Unsupported,
    Unknown,
}

impl ErrorKind {
    /// Whether the service factory's `with_retry` wrapper should transparently
    /// retry an error of this kind. Callers may still retry unrecoverable
    /// errors themselves; this only gates the library's own retry loop.
    #[must_use]
    pub const fn recoverable(self) -> bool {
        matches!(
            self,
            Self::MalformedToolCall
                | Self::IncompleteJson
                | Self::Network
                | Self::RateLimit
                | Self::Timeout
                | Self::Unknown
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MalformedToolCall => "malformed_tool_call",
            Self::IncompleteJson => "incomplete_json",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Unsupported => "unsupported",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The runtime's single error type.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CanonicalError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CanonicalError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    #[must_use]
    pub const fn recoverable(&self) -> bool {
        self.kind.recoverable()
    }
}

/// Classify a raw transport/provider error by message text and, when
/// available, HTTP status. Mirrors the substring-matching idiom the runtime
/// already uses for recognizing transient transport faults.
#[must_use]
pub fn classify(message: &str, http_status: Option<u16>) -> ErrorKind {
    if let Some(status) = http_status {
        match status {
            401 | 403 => return ErrorKind::Auth,
            429 => return ErrorKind::RateLimit,
            500..=599 => return ErrorKind::Network,
            _ => {}
        }
    }

    let lower = message.to_ascii_lowercase();
    const TRANSPORT_NEEDLES: &[&str] = &[
        "timed out",
        "timeout",
        "connection reset",
        "connection aborted",
        "broken pipe",
        "connection refused",
        "unexpected eof",
        "stream closed",
        "dns error",
    ];
    if TRANSPORT_NEEDLES.iter().any(|needle| lower.contains(needle)) {
        return ErrorKind::Network;
    }
    if lower.contains("rate limit") || lower.contains("too many requests") {
        return ErrorKind::RateLimit;
    }
    if lower.contains("unauthorized") || lower.contains("invalid api key") || lower.contains("forbidden") {
        return ErrorKind::Auth;
    }
    if lower.contains("cancelled") || lower.contains("canceled") {
        return ErrorKind::Cancelled;
    }
    ErrorKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds_match_the_closed_taxonomy_table() {
        assert!(ErrorKind::Network.recoverable());
        assert!(ErrorKind::RateLimit.recoverable());
        assert!(ErrorKind::Timeout.recoverable());
        assert!(ErrorKind::MalformedToolCall.recoverable());
        assert!(ErrorKind::IncompleteJson.recoverable());
        assert!(ErrorKind::Unknown.recoverable());
        assert!(!ErrorKind::Auth.recoverable());
        assert!(!ErrorKind::Cancelled.recoverable());
        assert!(!ErrorKind::Unsupported.recoverable());
    }

    #[test]
    fn classify_maps_http_status() {
        assert_eq!(classify("boom", Some(401)), ErrorKind::Auth);
        assert_eq!(classify("boom", Some(429)), ErrorKind::RateLimit);
        assert_eq!(classify("boom", Some(503)), ErrorKind::Network);
    }

    #[test]
    fn classify_maps_transport_messages() {
        assert_eq!(classify("Connection reset by peer", None), ErrorKind::Network);
        assert_eq!(classify("request timed out", None), ErrorKind::Network);
        assert_eq!(classify("unexpected eof while reading", None), ErrorKind::Network);
    }

    #[test]
    fn classify_falls_back_to_unknown() {
        assert_eq!(classify("something strange happened", None), ErrorKind::Unknown);
    }
}
