//! Error types for the VK platform layer.

use thiserror::Error;

/// Errors produced by API calls and the long-poll feed.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP request itself failed (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// VK answered with an error envelope instead of a response.
    #[error("VK API error {code} on '{method}': {message}")]
    Api {
        /// The method that was called.
        method: String,
        /// VK's numeric error code.
        code: i64,
        /// VK's error description.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed response from '{method}': {reason}")]
    Malformed {
        /// The method that was called.
        method: String,
        /// What was wrong with the body.
        reason: String,
    },
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
