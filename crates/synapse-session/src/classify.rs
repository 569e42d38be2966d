//! Maps wire units from either transport onto the shared `Event` vocabulary.

use synapse_core::types::{Event, PushMessage, PushStatus};

use crate::error::ProtocolError;
use crate::frame::Frame;

const THINKING_PREFIX: &str = "THINKING:";
const TOKEN_PREFIX: &str = "TOKEN:";

/// Fallback when an `ERROR` push message carries no text.
const UNKNOWN_ERROR: &str = "unknown error";

/// Classify one pull-transport frame.
///
/// Returns `Ok(None)` for lines that carry no event (blank lines, unknown
/// prefixes); these are not errors.
pub fn classify_frame(frame: &Frame) -> Result<Option<Event>, ProtocolError> {
    let line = frame.as_text()?;
    Ok(classify_line(line))
}

/// Classify one decoded pull-transport line.
pub fn classify_line(line: &str) -> Option<Event> {
    if let Some(rest) = line.strip_prefix(THINKING_PREFIX) {
        return Some(Event::thinking(rest.trim()));
    }

    if let Some(rest) = line.strip_prefix(TOKEN_PREFIX) {
        // `TOKEN: <text>`: drop the single separator space, keep the rest verbatim.
        let text = rest.strip_prefix(' ').unwrap_or(rest);
        return Some(Event::token(text));
    }

    None
}

/// Classify one push-transport message from its JSON text.
pub fn classify_push(text: &str) -> Result<Event, ProtocolError> {
    let message: PushMessage = serde_json::from_str(text)
        .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;
    Ok(classify_message(message))
}

/// Classify an already-parsed push message.
pub fn classify_message(message: PushMessage) -> Event {
    match message.status {
        PushStatus::Thinking => Event::thinking(message.message.unwrap_or_default()),
        PushStatus::Done => Event::Done {
            final_text: message.response,
        },
        PushStatus::Error => {
            Event::error(message.message.unwrap_or_else(|| UNKNOWN_ERROR.to_string()))
        }
    }
}
