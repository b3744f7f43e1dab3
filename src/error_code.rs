//! Failure categories produced by the error classifier.
//!
//! Each category carries a stable code, a name, a default retry flag and the
//! short user-facing message shown when no more specific text applies.
//!
//! | Prefix | Category     | Description                          |
//! |--------|--------------|--------------------------------------|
//! | E1xxx  | connectivity | Server unreachable, timeouts, resets |
//! | E2xxx  | access       | Auth, permissions, missing resources |
//! | E3xxx  | server       | Rate limiting and 5xx responses      |
//! | E4xxx  | caller       | Invalid arguments                    |
//! | E9xxx  | unknown      | Catch-all                            |
//!
//! ```rust
//! use opencode_runtime::error_code::FailureCategory;
//!
//! let cat = FailureCategory::from_http_status(429).unwrap();
//! assert_eq!(cat.code(), "E3001");
//! assert!(cat.retryable());
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// E1001: connection refused / nothing listening
    Unreachable,
    /// E1002: host name could not be resolved
    Unresolved,
    /// E1003: connect or request timed out
    TimedOut,
    /// E1004: connection reset mid-request
    ConnectionReset,
    /// E2001: HTTP 401
    Authentication,
    /// E2002: HTTP 403
    PermissionDenied,
    /// E2003: HTTP 404
    NotFound,
    /// E3001: HTTP 429
    RateLimited,
    /// E3002: HTTP 500/502/503
    ServerError,
    /// E4001: invalid caller input
    Validation,
    /// E9999: anything else
    Unknown,
}

impl FailureCategory {
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable => "E1001",
            Self::Unresolved => "E1002",
            Self::TimedOut => "E1003",
            Self::ConnectionReset => "E1004",
            Self::Authentication => "E2001",
            Self::PermissionDenied => "E2002",
            Self::NotFound => "E2003",
            Self::RateLimited => "E3001",
            Self::ServerError => "E3002",
            Self::Validation => "E4001",
            Self::Unknown => "E9999",
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Unresolved => "unresolved",
            Self::TimedOut => "timed_out",
            Self::ConnectionReset => "connection_reset",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }

    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable
                | Self::Unresolved
                | Self::TimedOut
                | Self::ConnectionReset
                | Self::RateLimited
                | Self::ServerError
        )
    }

    /// Default user-facing message. `Unknown` and `Validation` use the error text instead.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Unreachable => "Cannot reach the OpenCode server. Make sure it's running.",
            Self::Unresolved => {
                "Cannot reach the OpenCode server: the address could not be resolved."
            }
            Self::TimedOut => "Request timed out. The server might be busy or unresponsive.",
            Self::ConnectionReset => "Connection was reset. The server may have restarted.",
            Self::Authentication => "Authentication failed. Check your API key configuration.",
            Self::PermissionDenied => "Permission denied for this operation.",
            Self::NotFound => "Resource not found. The session or endpoint may not exist.",
            Self::RateLimited => "Rate limited. Please wait before making more requests.",
            Self::ServerError => "Server error. Please try again.",
            Self::Validation => "Invalid request.",
            Self::Unknown => "An unknown error occurred",
        }
    }

    /// Category for the HTTP statuses the classifier knows about.
    pub fn from_http_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(Self::Authentication),
            403 => Some(Self::PermissionDenied),
            404 => Some(Self::NotFound),
            429 => Some(Self::RateLimited),
            500 | 502 | 503 => Some(Self::ServerError),
            _ => None,
        }
    }

    /// Message for a classified HTTP status; the 5xx family gets status-specific text.
    pub fn message_for_status(status: u16) -> Option<&'static str> {
        match status {
            502 => Some("Server temporarily unavailable. Please try again."),
            503 => Some("Service unavailable. The server may be overloaded, try again."),
            _ => Self::from_http_status(status).map(|c| c.default_message()),
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        assert_eq!(
            FailureCategory::from_http_status(401),
            Some(FailureCategory::Authentication)
        );
        assert_eq!(
            FailureCategory::from_http_status(403),
            Some(FailureCategory::PermissionDenied)
        );
        assert_eq!(
            FailureCategory::from_http_status(404),
            Some(FailureCategory::NotFound)
        );
        assert_eq!(
            FailureCategory::from_http_status(429),
            Some(FailureCategory::RateLimited)
        );
        for s in [500, 502, 503] {
            assert_eq!(
                FailureCategory::from_http_status(s),
                Some(FailureCategory::ServerError)
            );
        }
        assert_eq!(FailureCategory::from_http_status(400), None);
        assert_eq!(FailureCategory::from_http_status(504), None);
    }

    #[test]
    fn retryable_flags() {
        assert!(FailureCategory::Unreachable.retryable());
        assert!(FailureCategory::RateLimited.retryable());
        assert!(!FailureCategory::Authentication.retryable());
        assert!(!FailureCategory::NotFound.retryable());
        assert!(!FailureCategory::Validation.retryable());
        assert!(!FailureCategory::Unknown.retryable());
    }

    #[test]
    fn display_shows_code_and_name() {
        assert_eq!(FailureCategory::TimedOut.to_string(), "E1003 (timed_out)");
    }

    #[test]
    fn unreachable_messages_mention_reach() {
        assert!(FailureCategory::Unreachable.default_message().contains("reach"));
        assert!(FailureCategory::Unresolved.default_message().contains("reach"));
    }
}
