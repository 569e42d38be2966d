//! Session state machine.
//!
//! A pure reducer over the session lifecycle:
//! - Idle -> Thinking (progress label)
//! - Thinking -> Thinking (label overwrite)
//! - Thinking -> Responding (first token, possibly empty)
//! - Responding -> Responding (append token)
//! - any -> Done (optional wholesale text replacement)
//! - any -> Error
//!
//! `Done` and `Error` are terminal. Anything else is ignored and reported as
//! a protocol-order warning; the reducer never fails.

use std::fmt;

use synapse_core::config::TransportKind;
use synapse_core::types::{Event, SessionState, UiDelta};
use uuid::Uuid;

/// One logical assistant response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub accumulated_text: String,
    /// Kind of the transport feeding this session.
    pub transport: TransportKind,
    text_source: TextSource,
}

/// How `accumulated_text` has been produced so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextSource {
    Empty,
    Streamed,
    Replaced,
}

impl Session {
    pub fn new(id: Uuid, transport: TransportKind) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            accumulated_text: String::new(),
            transport,
            text_source: TextSource::Empty,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn snapshot(&self) -> UiDelta {
        UiDelta {
            state: self.state.clone(),
            accumulated_text: self.accumulated_text.clone(),
        }
    }
}

/// Side effects requested by a reduction step, in the order they must run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The session became terminal: disarm the watchdog and close the transport.
    Terminate,
    /// Publish a snapshot to subscribers.
    Emit(UiDelta),
    /// Log a non-fatal protocol problem.
    Warn(ProtocolWarning),
}

/// Non-fatal protocol anomalies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolWarning {
    /// An event arrived that has no edge from the current state.
    OutOfOrder {
        state: &'static str,
        event: &'static str,
    },
    /// A `Done` replacement landed on text that had been streamed.
    MixedTextSources,
}

impl fmt::Display for ProtocolWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolWarning::OutOfOrder { state, event } => {
                write!(f, "ignored {} event in {} state", event, state)
            }
            ProtocolWarning::MixedTextSources => {
                write!(f, "final text replaced streamed text")
            }
        }
    }
}

/// Apply one event to the session and return the resulting effects.
pub fn reduce(session: &mut Session, event: Event) -> Vec<Effect> {
    if session.is_terminal() {
        return vec![out_of_order(&session.state, &event)];
    }

    let mut effects = Vec::new();

    match (&session.state, event) {
        (SessionState::Idle | SessionState::Thinking { .. }, Event::Thinking { label }) => {
            session.state = SessionState::Thinking { label };
        }
        (SessionState::Thinking { .. }, Event::Token { text }) => {
            session.state = SessionState::Responding;
            session.accumulated_text = text;
            session.text_source = TextSource::Streamed;
        }
        (SessionState::Responding, Event::Token { text }) => {
            session.accumulated_text.push_str(&text);
        }
        (_, Event::Done { final_text }) => {
            if let Some(final_text) = final_text {
                if session.text_source == TextSource::Streamed {
                    effects.push(Effect::Warn(ProtocolWarning::MixedTextSources));
                }
                session.accumulated_text = final_text;
                session.text_source = TextSource::Replaced;
            }
            session.state = SessionState::Done;
        }
        (_, Event::Error { message }) => {
            session.state = SessionState::Error { message };
        }
        (state, event) => {
            return vec![out_of_order(state, &event)];
        }
    }

    if session.is_terminal() {
        effects.push(Effect::Terminate);
    }
    effects.push(Effect::Emit(session.snapshot()));
    effects
}

fn out_of_order(state: &SessionState, event: &Event) -> Effect {
    Effect::Warn(ProtocolWarning::OutOfOrder {
        state: state.name(),
        event: event.kind(),
    })
}

// =============================================================================
// Tests
// =============================================================================
