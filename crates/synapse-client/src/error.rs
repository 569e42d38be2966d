//! Error types for the auxiliary HTTP clients.

use synapse_core::error::SynapseError;

/// Errors from health probes and graph fetches.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<SynapseError> for ClientError {
    fn from(err: SynapseError) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ClientError::Status(503).to_string(),
            "server returned status 503"
        );
        assert_eq!(
            ClientError::Decode("expected value".to_string()).to_string(),
            "failed to decode response: expected value"
        );
    }

    #[test]
    fn test_from_config_error() {
        let err: ClientError = SynapseError::Config("invalid url".to_string()).into();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: ClientError = err.into();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
