//! Error types for meshnode

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the meshnode Error
pub type Result<T> = std::result::Result<T, Error>;

/// meshnode error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid secret key: {0}")]
    InvalidKey(String),

    #[error("Service {service} failed to initialize: {source:#}")]
    ServiceInit {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Service {service} exited with error: {source:#}")]
    ServiceRun {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Service {service} failed to stop: {source:#}")]
    ServiceStop {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Service {0} not found")]
    ServiceNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Operation timeout after {0:?}")]
    Timeout(Duration),
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::InvalidKey(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_keeps_source_chain() {
        let err = Error::ServiceInit {
            service: "nat".to_string(),
            source: anyhow::anyhow!("gateway unreachable").context("upnp discovery"),
        };
        let msg = err.to_string();
        assert!(msg.contains("nat"));
        assert!(msg.contains("upnp discovery"));
        assert!(msg.contains("gateway unreachable"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
