//! Error types for the dyndns system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for dyndns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the dyndns system
#[derive(Error, Debug)]
pub enum Error {
    /// Public IP resolution failed (transient, retried on the next tick)
    #[error("IP resolver error: {0}")]
    Resolver(String),

    /// A provider update call failed (transient, retried on the next tick)
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider identifier
        provider: String,
        /// Error message, including the truncated response body
        message: String,
    },

    /// No provider is registered under the job's identifier
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The job's parameter payload does not match the provider's shape
    #[error("Malformed parameters for provider {provider}: {message}")]
    MalformedParams {
        /// Provider identifier
        provider: String,
        /// Decoding error
        message: String,
    },

    /// The persistence store is unavailable or failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operator-supplied configuration was rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// The rate guard denied the request
    #[error("Rate exceeded: {0}")]
    RateExceeded(String),

    /// Invalid scheduler lifecycle transition
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
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
    /// Create an IP resolver error
    pub fn resolver(msg: impl Into<String>) -> Self {
        Self::Resolver(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an unknown provider error
    pub fn unknown_provider(provider: impl Into<String>) -> Self {
        Self::UnknownProvider(provider.into())
    }

    /// Create a malformed parameters error
    pub fn malformed_params(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedParams {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a rate exceeded error
    pub fn rate_exceeded(msg: impl Into<String>) -> Self {
        Self::RateExceeded(msg.into())
    }

    /// Create a lifecycle error
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the next scheduler tick is expected to clear this error on its own.
    ///
    /// Configuration defects on a job (`UnknownProvider`, `MalformedParams`)
    /// stay until they are corrected out-of-band.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Resolver(_) | Self::Provider { .. } | Self::Persistence(_) | Self::Io(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
