//! Error types and result handling for the Warden supervisor

use thiserror::Error;

/// Result type alias for Warden operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Warden operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unexpected status: {0}")]
    StatusMismatch(String),

    #[error("Circuit breaker open: {0}")]
    BreakerOpen(String),

    #[error("Subprocess timed out: {0}")]
    SubprocessTimeout(String),

    #[error("Subprocess failed: {0}")]
    SubprocessFailure(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Sink write error: {0}")]
    SinkWrite(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Health check already in flight")]
    CheckInFlight,

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Network(_) => "network",
            Error::Timeout(_) => "timeout",
            Error::StatusMismatch(_) => "status-mismatch",
            Error::BreakerOpen(_) => "breaker-open",
            Error::SubprocessTimeout(_) => "subprocess-timeout",
            Error::SubprocessFailure(_) => "subprocess-failure",
            Error::Parse(_) => "parse",
            Error::SinkWrite(_) => "sink-write",
            Error::Io(_) => "io",
            Error::CheckInFlight => "check-in-flight",
            Error::ShutdownRequested => "shutdown",
            Error::Generic(_) => "generic",
        }
    }
}
