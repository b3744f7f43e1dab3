//! Error classification logic
//!
//! Maps any [`Error`] to a [`RetryDecision`]. The policy table is checked in
//! order for each link of the error's cause chain, first match wins:
//!
//! 1. connection refused / DNS failure / timeout: retryable
//! 2. connection reset mid-request: retryable
//! 3. HTTP 401 / 403: not retryable
//! 4. HTTP 404: not retryable
//! 5. HTTP 429: retryable, with a longer backoff
//! 6. HTTP 500 / 502 / 503: retryable
//! 7. otherwise move on to the next cause
//! 8. nothing matched: not retryable, raw error text

use crate::error::ProcessError;
use crate::error_code::FailureCategory;
use crate::transport::TransportError;
use crate::Error;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

/// Outcome of classifying one failure. Carries no identity; recompute freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryDecision {
    pub retryable: bool,
    pub category: FailureCategory,
    pub user_message: String,
    /// Server-requested wait (`Retry-After`), only set for rate limiting.
    pub retry_after: Option<Duration>,
}

impl RetryDecision {
    fn of(category: FailureCategory) -> Self {
        Self {
            retryable: category.retryable(),
            category,
            user_message: category.default_message().to_string(),
            retry_after: None,
        }
    }

    fn for_status(status: u16, retry_after_ms: Option<u64>) -> Option<Self> {
        let category = FailureCategory::from_http_status(status)?;
        let mut decision = Self::of(category);
        if let Some(msg) = FailureCategory::message_for_status(status) {
            decision.user_message = msg.to_string();
        }
        if category == FailureCategory::RateLimited {
            decision.retry_after = retry_after_ms.map(Duration::from_millis);
        }
        Some(decision)
    }

    /// Whether the caller should wait longer than the normal backoff step.
    pub fn wants_longer_backoff(&self) -> bool {
        self.category == FailureCategory::RateLimited
    }
}

/// Classify a failure. Pure and total.
pub fn classify(err: &Error) -> RetryDecision {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(link) = current {
        if let Some(decision) = classify_link(link) {
            return decision;
        }
        current = link.source();
    }

    let raw = err.to_string();
    RetryDecision {
        retryable: false,
        category: FailureCategory::Unknown,
        user_message: if raw.trim().is_empty() {
            FailureCategory::Unknown.default_message().to_string()
        } else {
            raw
        },
        retry_after: None,
    }
}

fn classify_link(link: &(dyn StdError + 'static)) -> Option<RetryDecision> {
    if let Some(err) = link.downcast_ref::<Error>() {
        return match err {
            Error::Remote {
                status,
                retry_after_ms,
                ..
            } => RetryDecision::for_status(*status, *retry_after_ms),
            Error::Validation { message, .. } => Some(RetryDecision {
                user_message: message.clone(),
                ..RetryDecision::of(FailureCategory::Validation)
            }),
            _ => None,
        };
    }

    if link.downcast_ref::<TransportError>().is_some()
        || link.downcast_ref::<ProcessError>().is_some()
    {
        return None;
    }

    if let Some(err) = link.downcast_ref::<reqwest::Error>() {
        if err.is_timeout() {
            return Some(RetryDecision::of(FailureCategory::TimedOut));
        }
        if err.is_connect() {
            let category = if chain_mentions_dns(link) {
                FailureCategory::Unresolved
            } else if chain_has_io_kind(link, io::ErrorKind::TimedOut) {
                FailureCategory::TimedOut
            } else {
                FailureCategory::Unreachable
            };
            return Some(RetryDecision::of(category));
        }
        if let Some(status) = err.status() {
            if let Some(decision) = RetryDecision::for_status(status.as_u16(), None) {
                return Some(decision);
            }
        }
        return None;
    }

    if let Some(err) = link.downcast_ref::<io::Error>() {
        if let Some(category) = category_for_io_kind(err.kind()) {
            return Some(RetryDecision::of(category));
        }
    }

    category_from_text(&link.to_string()).map(RetryDecision::of)
}

fn category_for_io_kind(kind: io::ErrorKind) -> Option<FailureCategory> {
    match kind {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable => {
            Some(FailureCategory::Unreachable)
        }
        io::ErrorKind::TimedOut => Some(FailureCategory::TimedOut),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Some(FailureCategory::ConnectionReset),
        _ => None,
    }
}

/// Lower layers (hyper, the resolver) only expose their failures as text.
fn category_from_text(text: &str) -> Option<FailureCategory> {
    let t = text.to_lowercase();
    if t.contains("dns error") || t.contains("failed to lookup address") {
        Some(FailureCategory::Unresolved)
    } else if t.contains("connection refused") {
        Some(FailureCategory::Unreachable)
    } else if t.contains("timed out") {
        Some(FailureCategory::TimedOut)
    } else if t.contains("connection reset")
        || t.contains("connection closed before message completed")
    {
        Some(FailureCategory::ConnectionReset)
    } else {
        None
    }
}

fn chain_mentions_dns(start: &(dyn StdError + 'static)) -> bool {
    let mut current = start.source();
    while let Some(link) = current {
        if category_from_text(&link.to_string()) == Some(FailureCategory::Unresolved) {
            return true;
        }
        current = link.source();
    }
    false
}

fn chain_has_io_kind(start: &(dyn StdError + 'static), kind: io::ErrorKind) -> bool {
    let mut current = start.source();
    while let Some(link) = current {
        if link
            .downcast_ref::<io::Error>()
            .map(|e| e.kind() == kind)
            .unwrap_or(false)
        {
            return true;
        }
        current = link.source();
    }
    false
}
