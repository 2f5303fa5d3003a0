use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrsyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad or missing setup; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The dedup ledger cannot be opened or written; fatal for the run.
    #[error("ledger unavailable: {0}")]
    StorageUnavailable(String),

    #[error("archive service error during {op}: {message}")]
    Service {
        op: &'static str,
        message: String,
        retryable: bool,
    },

    /// Encryption or compression failure on a single file.
    #[error("transform error: {0}")]
    Transform(String),
}

impl GrsyncError {
    /// Terminal service failure: never retried.
    pub fn service(op: &'static str, message: impl Into<String>) -> Self {
        GrsyncError::Service {
            op,
            message: message.into(),
            retryable: false,
        }
    }

    /// Transient service failure (throttling, dropped connection).
    pub fn transient(op: &'static str, message: impl Into<String>) -> Self {
        GrsyncError::Service {
            op,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GrsyncError::Service {
                retryable: true,
                ..
            }
        )
    }

    /// Startup-class errors propagate out of a run instead of failing one file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GrsyncError::Configuration(_) | GrsyncError::StorageUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for GrsyncError {
    fn from(e: rusqlite::Error) -> Self {
        GrsyncError::StorageUnavailable(e.to_string())
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, GrsyncError>;
