use crate::client::error_classification::{classify, RetryDecision};
use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field or argument that caused the error (e.g., "session_id", "response.parts").
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., the endpoint, the offending value).
    pub details: Option<String>,
    /// Component that raised the error (e.g., "transport_client", "event_stream").
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

/// Failures owning the backend process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command could not be executed at all (binary missing, not executable, ...).
    #[error("Failed to launch `{command}`: {source}")]
    LaunchFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited before the health check succeeded.
    #[error("Backend exited before becoming healthy ({status}){}", format_tail(.log_tail))]
    ExitedEarly {
        status: String,
        log_tail: Vec<String>,
    },

    /// The process stayed alive but never answered the health check in time.
    #[error("Backend did not become healthy within {timeout_ms}ms{}", format_last(.last_error))]
    HealthTimeout {
        timeout_ms: u64,
        last_error: Option<String>,
    },

    #[error("Backend process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Whether `start()` failed because the backend never came up.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            ProcessError::LaunchFailure { .. }
                | ProcessError::ExitedEarly { .. }
                | ProcessError::HealthTimeout { .. }
        )
    }
}

/// Unified error type for the OpenCode runtime.
///
/// REST and stream failures are returned as values so callers can branch on
/// [`Error::retry_decision`].
#[derive(Debug, Error)]
pub enum Error {
    /// Connectivity or timeout failure below HTTP.
    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-success HTTP status.
    #[error("Remote error: HTTP {status}: {message}")]
    Remote {
        status: u16,
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Malformed REST response.
    #[error("Protocol error: {message}{}", format_context(.context))]
    Protocol {
        message: String,
        context: ErrorContext,
    },

    /// Mid-stream I/O failure.
    #[error("Stream error: {message}")]
    Stream {
        message: String,
        #[source]
        cause: Option<TransportError>,
    },

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Caller passed an invalid argument. Never retried.
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// The orchestrator could not obtain a session for the prompt.
    #[error("Failed to create session: {source}")]
    SessionCreationFailed {
        #[source]
        source: Box<Error>,
    },

    /// Operation needs a running backend.
    #[error("Backend is not running")]
    NotRunning,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
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

fn format_tail(tail: &[String]) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("\nrecent output:\n{}", tail.join("\n"))
    }
}

fn format_last(last: &Option<String>) -> String {
    match last {
        Some(e) => format!(" (last error: {})", e),
        None => String::new(),
    }
}

impl Error {
    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new protocol error with structured context
    pub fn protocol_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Protocol {
            message: msg.into(),
            context,
        }
    }

    pub fn stream(msg: impl Into<String>, cause: Option<TransportError>) -> Self {
        Error::Stream {
            message: msg.into(),
            cause,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Protocol { context, .. } | Error::Validation { context, .. } => Some(context),
            _ => None,
        }
    }

    /// HTTP status of the response, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            Error::Transport(TransportError::Http(e)) => e.status().map(|s| s.as_u16()),
            Error::SessionCreationFailed { source } => source.status(),
            _ => None,
        }
    }

    /// Retry decision and user-facing message for this failure.
    pub fn retry_decision(&self) -> RetryDecision {
        classify(self)
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_decision().retryable
    }

    /// Short, actionable text suitable for end users.
    pub fn user_message(&self) -> String {
        self.retry_decision().user_message
    }
}

pub(crate) fn require_non_empty(value: &str, field: &str, source: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation_with_context(
            format!("{} must not be empty", field),
            ErrorContext::new()
                .with_field_path(field)
                .with_source(source),
        ));
    }
    Ok(())
}
