//! Error types for the retrieval module.

use thiserror::Error;

/// Errors that can occur while fetching a granule.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Request timed out.
    #[error("Request timed out")]
    Timeout,

    /// Could not reach the server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Credentials were rejected or a login page was served instead of data.
    #[error("Authentication failed for {url}")]
    Unauthorized { url: String },

    /// Transfer was interrupted while streaming the body.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Local I/O error writing the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Whether a later attempt may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            RetrievalError::Timeout
            | RetrievalError::ConnectionFailed(_)
            | RetrievalError::Transfer(_)
            | RetrievalError::Io(_) => true,
            RetrievalError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            RetrievalError::Unauthorized { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(RetrievalError::Timeout.is_retryable());
        assert!(RetrievalError::HttpStatus {
            status: 503,
            url: "u".into()
        }
        .is_retryable());
        assert!(!RetrievalError::HttpStatus {
            status: 404,
            url: "u".into()
        }
        .is_retryable());
        assert!(!RetrievalError::Unauthorized { url: "u".into() }.is_retryable());
    }
}
