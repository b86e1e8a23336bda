//! Restgate Error Types
//!
//! Every failure a caller can observe from the request pipeline.

use crate::client::RetryReason;
use std::time::Duration;

/// Main error type for restgate operations
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Payload could not be turned into bytes
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// An attachment's metadata or content could not be read
    #[error("Attachment error: file[{index}] ({name}): {source}")]
    Attachment {
        index: usize,
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Upstream rejected the request with a non-2xx, non-429 status
    #[error("{status_line} :: {body}")]
    Application {
        status: u16,
        status_line: String,
        body: String,
    },

    /// Success status, but the body could not be read to the end
    #[error("Failed to read response body: {0}")]
    BodyRead(#[source] reqwest::Error),

    /// Retry budget consumed without a definitive outcome
    #[error(
        "failed to make http request in {attempts} attempts to {method} :: {route} (last failure: {last})"
    )]
    ExhaustedRetries {
        method: String,
        route: String,
        attempts: u32,
        #[source]
        last: RetryReason,
    },

    /// Success body could not be decoded into the requested type
    #[error("Response decode error: {0}")]
    Decode(String),

    /// Client configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied cancellation signal fired
    #[error("Request cancelled")]
    Cancelled,

    /// Whole-call deadline elapsed
    #[error("Request timed out after {0:?}")]
    TimedOut(Duration),
}

impl RestError {
    /// HTTP status carried by an application-level rejection
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RestError {
    fn from(err: serde_json::Error) -> Self {
        RestError::Encoding(format!(
            "failed to serialize provided payload (make sure it's representable as JSON): {}",
            err
        ))
    }
}

/// Result type alias for restgate operations
pub type Result<T> = std::result::Result<T, RestError>;
