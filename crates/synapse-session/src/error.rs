//! Error types for session control and wire decoding.

use synapse_core::error::SynapseError;
use uuid::Uuid;

/// Errors returned to callers of the session controller and transports.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a session is already pending: {0}")]
    AlreadyPending(Uuid),
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("push socket is disconnected")]
    Disconnected,
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<SynapseError> for SessionError {
    fn from(err: SynapseError) -> Self {
        SessionError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

/// A wire unit that could not be classified. Never fatal: the unit is
/// dropped and logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
    #[error("malformed push message: {0}")]
    MalformedMessage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            SessionError::AlreadyPending(id).to_string(),
            "a session is already pending: 550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(
            SessionError::EmptyMessage.to_string(),
            "message cannot be empty"
        );
        assert_eq!(
            SessionError::MessageTooLong(4000).to_string(),
            "message exceeds maximum length of 4000 characters"
        );
        assert_eq!(
            SessionError::Transport("connection refused".to_string()).to_string(),
            "transport error: connection refused"
        );
        assert_eq!(
            SessionError::Disconnected.to_string(),
            "push socket is disconnected"
        );
    }

    #[test]
    fn test_session_error_from_synapse_error() {
        let err: SessionError = SynapseError::Config("bad url".to_string()).into();
        assert!(matches!(err, SessionError::Config(_)));
        assert!(err.to_string().contains("bad url"));
    }

    #[test]
    fn test_protocol_error_display() {
        assert_eq!(
            ProtocolError::InvalidUtf8 { valid_up_to: 3 }.to_string(),
            "frame is not valid UTF-8 (valid up to byte 3)"
        );
        assert_eq!(
            ProtocolError::MalformedMessage("missing status".to_string()).to_string(),
            "malformed push message: missing status"
        );
    }
}
