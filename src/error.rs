use crate::error_code::{FailureKind, RemoteError};
use thiserror::Error;

/// Structured error context for configuration and cancellation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Configuration key that caused the error (e.g., "limiter.max_requests")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., the rejected value)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "rate_limiter", "backoff")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the resilience layer.
///
/// Only two variants matter to callers of the retry policy: [`Error::RateLimited`]
/// (throttling persisted through every allowed attempt) and [`Error::Remote`]
/// (a non-retryable failure, passed through exactly as the operation produced it).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Rate limited after {attempts} attempt(s): {source}")]
    RateLimited {
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("Operation cancelled{}", format_context(.context))]
    Cancelled { context: ErrorContext },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::Remote(err)
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a cancellation error attributed to `source`
    pub fn cancelled(source: impl Into<String>) -> Self {
        Error::Cancelled {
            context: ErrorContext::new().with_source(source),
        }
    }

    /// Classify this error for the retry policy.
    ///
    /// Only remote failures can be rate limited; local errors are always `Other`.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::RateLimited { .. } => FailureKind::RateLimited,
            Error::Remote(remote) => remote.kind(),
            _ => FailureKind::Other,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.failure_kind() == FailureKind::RateLimited
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// The remote failure carried by this error, if any
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Error::RateLimited { source, .. } => Some(source),
            Error::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Cancelled { context } => Some(context),
            _ => None,
        }
    }
}
