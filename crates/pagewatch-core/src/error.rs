//! Error types and handling for pagewatch-core operations.
//!
//! Errors are grouped by the collaborator that produced them so the change
//! detector can decide what to do with each one:
//!
//! - **Transport errors** (`Network`, `HttpStatus`, `NotFound`, `Timeout`,
//!   `InvalidUrl`): retried by the transport when [`Error::is_recoverable`]
//!   says so, then surfaced to the detector.
//! - **Storage errors** (`Io`, `Storage`, `Serialization`): never retried by
//!   the detector.
//! - **Configuration errors** (`Config`): only raised while loading settings.
//!
//! The detector never lets any of these escape; it converts them into a
//! failed execution record. Callers that use the lower-level building blocks
//! directly get a plain [`Result`].
//!
//! ```rust
//! use pagewatch_core::Error;
//!
//! let err = Error::HttpStatus { url: "https://example.com".into(), status: 503 };
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "http_status");
//! ```

use thiserror::Error;

/// The main error type for pagewatch-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers reading and appending history logs and writing content files.
    /// Timeouts and interruptions are considered recoverable.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Connection and timeout errors are recoverable, everything else
    /// (TLS failures, malformed responses) is permanent.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The origin answered with a non-success status code.
    ///
    /// Server errors (5xx) and `429 Too Many Requests` are retried.
    #[error("HTTP {status} returned by '{url}'")]
    HttpStatus {
        /// URL that was requested.
        url: String,
        /// Status code returned by the origin.
        status: u16,
    },

    /// Requested resource was not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// URL is malformed or uses an unsupported scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Operation timed out.
    ///
    /// Raised when a request exceeds the configured HTTP timeout, or when
    /// another process keeps a URL's history locked for too long.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Storage operation failed.
    ///
    /// Used for history and content store failures beyond plain I/O, such as
    /// unsafe execution identifiers or directory creation failures.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    ///
    /// Raised when a history line or configuration file cannot be converted
    /// to or from its on-disk representation.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// The HTTP transport consults this after every failed attempt; only
    /// recoverable errors consume another attempt from the retry policy.
    ///
    /// ```rust
    /// use pagewatch_core::Error;
    /// use std::io;
    ///
    /// assert!(Error::Timeout("probe".into()).is_recoverable());
    /// assert!(Error::Io(io::Error::new(io::ErrorKind::Interrupted, "eintr")).is_recoverable());
    /// assert!(!Error::NotFound("gone".into()).is_recoverable());
    /// assert!(!Error::Storage("disk full".into()).is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier.
    ///
    /// Used as a structured field when failures are logged.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::HttpStatus { .. } => "http_status",
            Self::NotFound(_) => "not_found",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
