//! Domain types shared by transports, the session reducer, and views.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Events
// =============================================================================

/// A classified, transport-agnostic protocol message consumed by the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The assistant is working; `label` describes the current step.
    Thinking { label: String },
    /// A fragment of response text, preserved verbatim.
    Token { text: String },
    /// The response is complete. `final_text`, when present, replaces
    /// everything accumulated so far.
    Done { final_text: Option<String> },
    /// The response failed.
    Error { message: String },
}

impl Event {
    pub fn thinking(label: impl Into<String>) -> Self {
        Event::Thinking {
            label: label.into(),
        }
    }

    pub fn token(text: impl Into<String>) -> Self {
        Event::Token { text: text.into() }
    }

    pub fn done() -> Self {
        Event::Done { final_text: None }
    }

    pub fn done_with(final_text: impl Into<String>) -> Self {
        Event::Done {
            final_text: Some(final_text.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Done { .. } | Event::Error { .. })
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Thinking { .. } => "thinking",
            Event::Token { .. } => "token",
            Event::Done { .. } => "done",
            Event::Error { .. } => "error",
        }
    }
}

// =============================================================================
// Session state
// =============================================================================

/// Lifecycle state of one assistant response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Submitted, nothing received yet.
    Idle,
    /// The assistant reported progress.
    Thinking { label: String },
    /// Response text is streaming in.
    Responding,
    /// The response completed.
    Done,
    /// The response failed; streamed text is kept.
    Error { message: String },
}

impl SessionState {
    /// `Done` and `Error` accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Thinking { .. } => "thinking",
            SessionState::Responding => "responding",
            SessionState::Done => "done",
            SessionState::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Thinking { label } => write!(f, "Thinking({})", label),
            SessionState::Responding => write!(f, "Responding"),
            SessionState::Done => write!(f, "Done"),
            SessionState::Error { message } => write!(f, "Error({})", message),
        }
    }
}

/// Snapshot published to view subscribers after every reduction step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiDelta {
    pub state: SessionState,
    pub accumulated_text: String,
}

impl UiDelta {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            accumulated_text: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

// =============================================================================
// Wire messages
// =============================================================================

/// Body of an outbound submission, shared by both transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub user_input: String,
    pub source: String,
}

/// Status carried by a push-transport message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PushStatus {
    Thinking,
    Done,
    Error,
}

/// One inbound push-transport message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub status: PushStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}
