//! Provider-specific error types.
//!
//! Cloud API failures are mapped into these variants so callers can tell an
//! authentication problem from a missing resource or a rate limit, even though
//! every one of them ends the provisioning flow.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication failed (missing or rejected API key)
    #[error("Authentication failed for {provider}: {message}")]
    Authentication { provider: String, message: String },

    /// Rate limit exceeded - includes the server's retry-after hint if any
    #[error("Rate limit exceeded{}", .retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimit { retry_after: Option<Duration> },

    /// Resource not found (instance, network, disk image)
    #[error("{resource_type} not found: {id}")]
    NotFound { resource_type: String, id: String },

    /// Invalid configuration or request parameters
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Unknown provider name
    #[error("Unknown provider: {name}. Supported providers: {supported:?}")]
    UnknownProvider {
        name: String,
        supported: Vec<String>,
    },
}

impl ProviderError {
    /// Create an authentication error
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create an API error from status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
