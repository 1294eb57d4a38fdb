//! Error types for the tempmail-sync crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are categorized by their retryability - see [`Error::is_retryable`] - and by the
//! provider call that produced them - see [`Error::operation`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// A call made against the mail provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `GET /domains`
    ListDomains,
    /// `POST /accounts`
    CreateAccount,
    /// `POST /token`
    IssueToken,
    /// `GET /messages`
    ListMessages,
    /// `GET /messages/{id}`
    FetchMessage,
}

impl Operation {
    /// Returns `true` for the calls that make up mailbox provisioning.
    ///
    /// Failures of these calls are reported to subscribers and retried after a fixed delay.
    /// A rejection from one of them outside provisioning means the account's credentials
    /// are no longer valid.
    #[must_use]
    pub fn is_provisioning(self) -> bool {
        matches!(
            self,
            Operation::ListDomains | Operation::CreateAccount | Operation::IssueToken
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::ListDomains => write!(f, "list domains"),
            Operation::CreateAccount => write!(f, "create account"),
            Operation::IssueToken => write!(f, "issue token"),
            Operation::ListMessages => write!(f, "list messages"),
            Operation::FetchMessage => write!(f, "fetch message"),
        }
    }
}

/// Errors that can occur during mailbox operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// The provider handed out an address that is not a valid email address.
    #[error("invalid email address: {address}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
    },

    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client")]
    HttpClient {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The configured proxy could not be used.
    #[error("invalid proxy {proxy}")]
    InvalidProxy {
        /// The proxy, with credentials masked.
        proxy: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Transport errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// The request could not be sent or the response could not be read.
    #[error("{operation} request failed")]
    Request {
        /// The provider call that failed.
        operation: Operation,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within the configured timeout.
    #[error("{operation} request timed out")]
    Timeout {
        /// The provider call that timed out.
        operation: Operation,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Provider protocol errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The provider answered with an unexpected HTTP status.
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        /// The provider call that failed.
        operation: Operation,
        /// The HTTP status code.
        status: u16,
        /// The (truncated) response body.
        body: String,
    },

    /// The bearer token was rejected.
    #[error("{operation} was rejected as unauthorized")]
    Unauthorized {
        /// The provider call that was rejected.
        operation: Operation,
    },

    /// The provider has no domains available for new accounts.
    #[error("provider returned no available domains")]
    NoDomains,

    /// The response body was not the expected JSON.
    #[error("failed to decode {operation} response")]
    Decode {
        /// The provider call whose response failed to decode.
        operation: Operation,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Provisioning kept failing until the configured attempt limit.
    #[error("mailbox provisioning failed after {attempts} attempts")]
    ProvisioningExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last provisioning error.
        #[source]
        source: Box<Error>,
    },

    /// An inbox operation was requested before a mailbox exists.
    #[error("no active mailbox")]
    NoMailbox,

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Reading or writing the state file failed.
    #[error("state file I/O failed for {}", .path.display())]
    StateIo {
        /// The state file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Persisted state could not be (de)serialized.
    #[error("malformed persisted state for key '{key}'")]
    StateFormat {
        /// The key (or file) that held malformed data.
        key: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// ```ignore
    /// if error.is_retryable() {
    ///     // Wait and retry
    /// } else {
    ///     // Fail permanently
    /// }
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Request { .. }
            | Error::Timeout { .. }
            | Error::NoDomains
            | Error::Decode { .. } => true,

            // 4xx are our fault, anything else is the provider's and may clear up
            Error::Status { status, .. } => *status == 429 || *status >= 500,

            Error::InvalidConfig { .. }
            | Error::InvalidAddress { .. }
            | Error::HttpClient { .. }
            | Error::InvalidProxy { .. }
            | Error::Unauthorized { .. }
            | Error::ProvisioningExhausted { .. }
            | Error::NoMailbox
            | Error::StateIo { .. }
            | Error::StateFormat { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig { .. }
            | Error::InvalidAddress { .. }
            | Error::HttpClient { .. }
            | Error::InvalidProxy { .. } => ErrorCategory::Configuration,

            Error::Request { .. } => ErrorCategory::Network,

            Error::Timeout { .. } => ErrorCategory::Timeout,

            Error::Status { .. } | Error::NoDomains | Error::ProvisioningExhausted { .. } => {
                ErrorCategory::Protocol
            }

            Error::Unauthorized { .. } => ErrorCategory::Auth,

            Error::Decode { .. } => ErrorCategory::Parse,

            Error::StateIo { .. } | Error::StateFormat { .. } => ErrorCategory::Storage,

            Error::NoMailbox => ErrorCategory::NotFound,
        }
    }

    /// Returns the provider call that produced this error, if any.
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::Request { operation, .. }
            | Error::Timeout { operation, .. }
            | Error::Status { operation, .. }
            | Error::Unauthorized { operation }
            | Error::Decode { operation, .. } => Some(*operation),
            Error::NoDomains => Some(Operation::ListDomains),
            Error::ProvisioningExhausted { source, .. } => source.operation(),
            _ => None,
        }
    }

    /// Returns `true` if the provider rejected the auth token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized { .. })
    }

    /// Wraps a reqwest error for `operation`, separating timeouts and decode failures.
    pub(crate) fn from_reqwest(operation: Operation, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Error::Timeout { operation, source }
        } else if source.is_decode() {
            Error::Decode { operation, source }
        } else {
            Error::Request { operation, source }
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// Unexpected provider responses.
    Protocol,
    /// Rejected credentials or token.
    Auth,
    /// Response decoding errors.
    Parse,
    /// Local persistence errors.
    Storage,
    /// Missing state.
    NotFound,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Auth => write!(f, "auth"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::NotFound => write!(f, "not_found"),
        }
    }
}
