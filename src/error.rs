// src/error.rs
//! Application error types with structured error handling.
//!
//! Error types form the vocabulary for failure modes in the system. Local
//! recovery (retries, backoff, quota waits) happens inside the search and
//! extraction layers; what reaches the caller is either exhaustion of those
//! bounded retries or a structural problem with the request itself.

use crate::api::QuotaReport;
use crate::search::QuotaPoolClass;
use crate::types::Window;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// GitHub API failure classes as a typed vocabulary.
///
/// GitHub reports most failures through the HTTP status plus a free-text
/// `message`; this enum lifts the combinations we react to into the type
/// system so recovery can pattern-match instead of string-match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubErrorCode {
    /// Primary quota exhausted; wait for the reset
    RateLimited,
    /// Abuse detection or secondary limit; back off for `retry-after`
    SecondaryRateLimit,
    /// The resource does not exist or the token cannot see it
    NotFound,
    /// Token missing, invalid or expired
    Unauthorized,
    /// Token lacks permission for this resource
    Forbidden,
    /// The query or request body failed validation (422)
    ValidationFailed,
    /// GitHub internal error
    InternalError,
    /// GitHub or an intermediary is temporarily unavailable
    ServiceUnavailable,
    /// The request timed out on the server side
    Timeout,
    /// A search answered with `incomplete_results`: counts and items are partial
    IncompleteResults,
    /// Any other status
    HttpStatus(u16),
}

impl GitHubErrorCode {
    /// Classifies a failed response from its status and error message.
    pub fn from_response(status: u16, message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        match status {
            401 => Self::Unauthorized,
            403 | 429 if lowered.contains("secondary rate limit") => Self::SecondaryRateLimit,
            403 | 429 if lowered.contains("rate limit") => Self::RateLimited,
            429 => Self::RateLimited,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            408 => Self::Timeout,
            422 => Self::ValidationFailed,
            500 => Self::InternalError,
            502..=504 => Self::ServiceUnavailable,
            other => Self::HttpStatus(other),
        }
    }

    /// Whether this error is transient and worth retrying with the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InternalError
            | Self::ServiceUnavailable
            | Self::Timeout
            | Self::IncompleteResults => true,
            Self::HttpStatus(code) => (500..=599).contains(code),
            _ => false,
        }
    }

    /// Whether this error is a quota signal rather than a failure.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited | Self::SecondaryRateLimit)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl fmt::Display for GitHubErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::SecondaryRateLimit => write!(f, "secondary_rate_limit"),
            Self::NotFound => write!(f, "not_found"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::InternalError => write!(f, "internal_server_error"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::Timeout => write!(f, "timeout"),
            Self::IncompleteResults => write!(f, "incomplete_results"),
            Self::HttpStatus(code) => write!(f, "http_{}", code),
        }
    }
}

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to parse request definition {path}: {source}")]
    ConfigParse {
        path: std::path::PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Network failure: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error("GitHub API returned an error ({code}, HTTP {status}): {message}")]
    GitHubService {
        code: GitHubErrorCode,
        message: String,
        status: u16,
    },

    /// The service refused a call for lack of quota. Not a failure: the
    /// governor absorbs it and the call is retried after the wait.
    #[error("Rate limit exceeded for the {pool} pool")]
    RateLimited {
        pool: QuotaPoolClass,
        quota: Option<QuotaReport>,
        retry_after: Option<Duration>,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Filesystem IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Window {window} is still over the search cap at the finest granularity")]
    PartitionExhausted { window: Window },

    #[error("Enumeration aborted at window {window} after collecting {collected} items: {cause}")]
    PartitionAborted {
        window: Window,
        collected: usize,
        cause: String,
    },

    #[error("Failed to record completion of {entity}/{kind} in the ledger: {reason}")]
    LedgerWrite {
        entity: String,
        kind: String,
        reason: String,
    },

    #[error("Failed to write outputs: {}", failures.join("; "))]
    DeliveryFailed { failures: Vec<String> },

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(transparent)]
    Validation(#[from] crate::types::ValidationError),
}

impl AppError {
    /// Timeouts, dropped connections and 5xx responses: worth repeating the
    /// same request after a pause.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkFailure(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.is_request()
                    || err.status().is_some_and(|s| s.is_server_error())
            }
            Self::GitHubService { code, .. } => code.is_retryable(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// Allow converting from anyhow::Error, preserving the message
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError {
            message: err.to_string(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedResponse(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T, E = AppError> = std::result::Result<T, E>;
