use thiserror::Error;

use crate::providers::ProviderError;

/// Cloudflare-specific errors that can occur during API operations.
///
/// SECURITY: Error messages must NEVER contain sensitive data like API tokens.
#[derive(Debug, Error)]
pub enum CloudflareError {
    /// Authentication failed (invalid or expired token)
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// API returned an error response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network-level error (connection failed, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// The object does not exist or the token cannot see it
    #[error("{resource_type} not found: '{id}'")]
    NotFound { resource_type: String, id: String },

    #[error("unexpected response for {resource_type}: {message}")]
    Decode {
        resource_type: String,
        message: String,
    },
}

impl From<CloudflareError> for ProviderError {
    fn from(err: CloudflareError) -> Self {
        match err {
            CloudflareError::Auth { message } => ProviderError::Auth(message),
            other => ProviderError::Cloudflare(other.to_string()),
        }
    }
}
