//! Configuration Client Error Hierarchy
//!
//! Only [`Error::Parameter`], [`Error::AccessDenied`] and [`Error::Filter`] are
//! meant to reach callers of the public read/write operations. Network and
//! server failures are absorbed into tier fallback (reads) or a `false`
//! result (writes), and are paired with a diagnostic log entry.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Blank or malformed key fields, missing content
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    /// The server answered with HTTP 403
    #[error("Access denied (status {status}): {message}")]
    AccessDenied { status: u16, message: String },

    /// I/O failure while talking to the configuration service
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Non-2xx, non-403 answer from the configuration service
    #[error("Server responded with status {status}: {message}")]
    Server { status: u16, message: String },

    /// Local failover/snapshot cache failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Client configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A content filter refused the content
    #[error("Filter {filter} rejected content: {reason}")]
    Filter { filter: String, reason: String },

    /// Unrecoverable failures, e.g. the change poller is gone
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Request did not complete in time
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Unreachable server with source context, for agents wrapping their
    /// client library's connection errors
    #[error("Network unreachable: {source}")]
    Unreachable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport level failure without a richer source
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures while reading or writing cache records
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// I/O failure bound to a cache record path
    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    /// `true` for explicit 403 answers from the server
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied { .. })
    }

    /// Failures that may succeed when tried again later.
    ///
    /// Programmer errors and authorization failures never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Storage(_) => true,
            Error::Server { status, .. } => *status >= 500 || *status == 409,
            _ => false,
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        NetworkError::TaskFailed(err).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err).into()
    }
}
