//! Typed errors for outbound fetches and per-source processing.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failures from the fetch guard. Each variant is distinguishable so callers
/// can report an actionable code upstream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Not absolute, not https, carries credentials, or the host did not resolve.
    #[error("invalid outbound url: {0}")]
    InvalidUrl(String),

    /// Local hostname, outside the allowlist, or resolves to a blocked address.
    #[error("host not allowed: {0}")]
    DisallowedHost(String),

    #[error("request timeout")]
    Timeout,

    #[error("response size limit exceeded ({limit} bytes)")]
    SizeLimit { limit: usize },

    /// Any non-2xx status, including redirects (which are never followed).
    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("request cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// True for the SSRF gates (URL shape and host policy).
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::InvalidUrl(_) | FetchError::DisallowedHost(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Failure of one source's fetch+parse cycle. Fatal to that source only.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported source kind: {0}")]
    UnsupportedKind(String),

    #[error("mapping error: {0}")]
    Mapping(String),

    #[error("invalid {format} payload: {reason}")]
    Format { format: &'static str, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl SourceError {
    pub fn format(format: &'static str, reason: impl fmt::Display) -> Self {
        SourceError::Format {
            format,
            reason: reason.to_string(),
        }
    }

    /// Configuration problems, as opposed to network or payload problems.
    pub fn is_config(&self) -> bool {
        matches!(self, SourceError::UnsupportedKind(_) | SourceError::Mapping(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SourceError::UnsupportedKind(_) | SourceError::Format { .. } => ErrorCode::InvalidFormat,
            SourceError::Mapping(_) => ErrorCode::MappingError,
            SourceError::Fetch(e) if e.is_blocked() => ErrorCode::SsrfBlocked,
            SourceError::Fetch(FetchError::Timeout) => ErrorCode::Timeout,
            SourceError::Fetch(_) => ErrorCode::TestError,
        }
    }
}

/// Structured error codes reported by the connection-test path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SsrfBlocked,
    MappingError,
    InvalidFormat,
    Timeout,
    InsufficientItems,
    TestError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SsrfBlocked => "SSRF_BLOCKED",
            ErrorCode::MappingError => "MAPPING_ERROR",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InsufficientItems => "INSUFFICIENT_ITEMS",
            ErrorCode::TestError => "TEST_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
