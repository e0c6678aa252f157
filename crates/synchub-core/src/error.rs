//! Error types for the synchub engine
//!
//! Two layers live here:
//!
//! - [`UpdateError`]: what a fetch hook (or a push transport) reports about a
//!   single refresh. These are absorbed into coordinator state.
//! - [`Error`]: what the engine itself returns to callers (startup, forced
//!   refresh, configuration loading).

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`UpdateError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The fetch exceeded its deadline
    Timeout,
    /// Network or device-protocol failure
    Connection,
    /// The source reported that its fetch failed
    Source,
    /// Credentials were rejected
    Authentication,
    /// The source will never accept this request
    Rejected,
    /// The fetch hook is missing or misconfigured
    Programming,
}

/// Failure reported by a fetch hook
///
/// `Clone` so the coordinator can keep the most recent one as `last_error`
/// while still handing it to the startup caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Fetch exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Transport or connection fault, generally transient
    #[error("connection error: {0}")]
    Connection(String),

    /// Generic failure reported by the data source
    #[error("{0}")]
    Failed(String),

    /// Credentials rejected; needs re-authentication rather than a retry
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The source will never succeed with this configuration
    #[error("permanently rejected: {0}")]
    Rejected(String),

    /// A hook is missing or misconfigured
    #[error("misconfigured fetch hook: {0}")]
    Misconfigured(String),
}

impl UpdateError {
    /// Create a source-reported failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a permanent rejection
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a programming error
    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::Misconfigured(msg.into())
    }

    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Failed(_) => ErrorKind::Source,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::Misconfigured(_) => ErrorKind::Programming,
        }
    }

    /// Whether a retry on the normal schedule may succeed
    ///
    /// Only transient errors are eligible for failure tolerance.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::Failed(_)
        )
    }
}

/// Fetchers written against `anyhow` surface as source-reported failures
impl From<anyhow::Error> for UpdateError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

/// Core error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication rejected during first refresh
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Source permanently rejected the configuration during first refresh
    #[error("Rejected by source: {0}")]
    Rejected(String),

    /// Misconfigured fetch hook; never absorbed into coordinator state
    #[error("Programming error in {coordinator}: {message}")]
    Programming {
        /// Coordinator name
        coordinator: String,
        /// Error message
        message: String,
    },

    /// I/O errors (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a programming error for a coordinator
    pub fn programming(coordinator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Programming {
            coordinator: coordinator.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
