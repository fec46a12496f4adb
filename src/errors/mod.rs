//! Error types for the product council client.
//!
//! Every failure a report generation can run into is one variant of
//! [`CouncilError`]. Per-record stream parse failures are represented too,
//! but the stream decoder logs and skips them instead of propagating.

use thiserror::Error;

/// Result type alias for product council operations.
pub type CouncilResult<T> = Result<T, CouncilError>;

/// Error type for product council operations.
#[derive(Debug, Error)]
pub enum CouncilError {
    /// Required product context was missing or an upload was rejected.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation issue.
        message: String,
        /// The field that failed validation.
        field: Option<String>,
    },

    /// Base URL or API key has not been configured yet.
    #[error("Configuration missing: {message}")]
    ConfigMissing {
        /// What is missing.
        message: String,
    },

    /// Configuration could not be loaded, saved or parsed.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },

    /// The endpoint answered with a non-success status before streaming.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text, verbatim.
        body: String,
    },

    /// A single SSE record carried a payload that is not valid JSON.
    #[error("Stream parse error: {message}")]
    StreamParse {
        /// Parser error message.
        message: String,
        /// The offending payload.
        payload: String,
    },

    /// Connection failure or body read failure.
    #[error("Network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// Request body could not be encoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// The in-flight stream was cancelled by a reset.
    #[error("Report generation cancelled")]
    Cancelled,
}

impl CouncilError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        CouncilError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a validation error for a named field.
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        CouncilError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a configuration-missing error.
    pub fn config_missing(message: impl Into<String>) -> Self {
        CouncilError::ConfigMissing {
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        CouncilError::Network {
            message: message.into(),
        }
    }

    /// Returns true if re-triggering the same request might succeed.
    ///
    /// Nothing in this crate retries automatically; this only informs the
    /// message shown to the user.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CouncilError::Network { .. } | CouncilError::Http { status: 500..=599, .. }
        )
    }

    /// Returns true for errors that should redirect the user to settings.
    pub fn needs_configuration(&self) -> bool {
        matches!(
            self,
            CouncilError::ConfigMissing { .. } | CouncilError::Http { status: 401 | 403, .. }
        )
    }
}

impl From<reqwest::Error> for CouncilError {
    fn from(err: reqwest::Error) -> Self {
        CouncilError::Network {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CouncilError {
    fn from(err: serde_json::Error) -> Self {
        CouncilError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for CouncilError {
    fn from(err: url::ParseError) -> Self {
        CouncilError::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}
