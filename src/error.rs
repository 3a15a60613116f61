//! Error types for Tollgate.

use thiserror::Error;

use crate::ratelimit::ClientTier;
use crate::store::StoreError;

/// Main error type for Tollgate operations.
///
/// Capacity decisions never produce one of these; callers only ever see
/// admit/deny plus metadata. Errors come from wiring and from the boundary.
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A composition was asked to serve a tier with no registered limiter
    #[error("No rate limiter configured for tier {0}")]
    UnconfiguredTier(ClientTier),

    /// Empty or blank client identifier
    #[error("Invalid client id: {0:?}")]
    InvalidClientId(String),

    /// State store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Reject identifiers that cannot name a client.
///
/// This is a boundary check; limiters themselves accept any string.
pub fn validate_client_id(client_id: &str) -> Result<&str> {
    if client_id.trim().is_empty() {
        return Err(AdmissionError::InvalidClientId(client_id.to_string()));
    }
    Ok(client_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_client_id() {
        assert_eq!(validate_client_id("client-1").unwrap(), "client-1");
        assert!(matches!(
            validate_client_id(""),
            Err(AdmissionError::InvalidClientId(_))
        ));
        assert!(matches!(
            validate_client_id("   "),
            Err(AdmissionError::InvalidClientId(_))
        ));
    }

    #[test]
    fn test_unconfigured_tier_message() {
        let err = AdmissionError::UnconfiguredTier(ClientTier::Premium);
        assert_eq!(err.to_string(), "No rate limiter configured for tier premium");
    }
}
