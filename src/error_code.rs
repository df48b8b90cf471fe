//! Remote failure classification.
//!
//! The retry policy only distinguishes two kinds of failure:
//!
//! | Kind          | Retried | Typical causes                                   |
//! |---------------|---------|--------------------------------------------------|
//! | `RateLimited` | yes     | HTTP 429, `rate_limit_exceeded` provider codes   |
//! | `Other`       | no      | not found, forbidden, unreachable, bad input ... |
//!
//! Classification looks at structured fields first (status code, then provider
//! error code). Matching "rate limit" inside the free-text message is a fallback
//! for transports that expose nothing else, and is logged at debug level when it fires.
//!
//! ## Example
//!
//! ```rust
//! use api_resilience::error_code::{FailureKind, RemoteError};
//!
//! let err = RemoteError::new(429, "Too Many Requests");
//! assert_eq!(err.kind(), FailureKind::RateLimited);
//!
//! let err = RemoteError::new(404, "thread not found");
//! assert_eq!(err.kind(), FailureKind::Other);
//! ```

use std::fmt;
use tracing::debug;

/// HTTP status the remote API uses to signal throttling.
pub const RATE_LIMITED_STATUS: u16 = 429;

/// Closed set of failure kinds the retry policy acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Remote call reported throttling; safe to retry after a delay.
    RateLimited,
    /// Anything else; propagated unchanged on first occurrence.
    Other,
}

impl FailureKind {
    /// Returns the standard name (e.g., `"rate_limited"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Other => "other",
        }
    }

    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Maps a provider error code/type string to a failure kind.
    ///
    /// Returns `None` for codes that carry no throttling information, so the
    /// caller can keep looking at other fields.
    pub fn from_provider_code(provider_code: &str) -> Option<Self> {
        match provider_code.to_ascii_lowercase().as_str() {
            "rate_limited" | "rate_limit_exceeded" | "ratelimit" | "ratelimited"
            | "too_many_requests" => Some(Self::RateLimited),
            _ => None,
        }
    }

    /// Maps an HTTP status code to a failure kind.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            RATE_LIMITED_STATUS => Self::RateLimited,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure reported by the caller-supplied remote operation.
///
/// Transports fill in whatever they have: a status code, a provider error
/// code, and a message. At least the message is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    /// Provider error code or type (e.g., `"rate_limit_exceeded"`)
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    /// A failure with no status code (e.g., a connection error).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn kind(&self) -> FailureKind {
        classify(self.status, self.code.as_deref(), &self.message)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code.as_deref()) {
            (Some(status), Some(code)) => write!(f, "HTTP {} ({}): {}", status, code, self.message),
            (Some(status), None) => write!(f, "HTTP {}: {}", status, self.message),
            (None, Some(code)) => write!(f, "{}: {}", code, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Classify a remote failure from its structured fields.
///
/// Order: status code, then provider code, then the message fallback.
pub fn classify(status: Option<u16>, code: Option<&str>, message: &str) -> FailureKind {
    if let Some(status) = status {
        if FailureKind::from_http_status(status) == FailureKind::RateLimited {
            return FailureKind::RateLimited;
        }
    }
    if let Some(kind) = code.and_then(FailureKind::from_provider_code) {
        return kind;
    }
    if message.to_lowercase().contains("rate limit") {
        debug!(
            status = ?status,
            text = message,
            "classified as rate limited from message text"
        );
        return FailureKind::RateLimited;
    }
    FailureKind::Other
}
