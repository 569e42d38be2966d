//! Terminal rendering of session snapshots.
//!
//! The view is a passive subscriber: it receives every `UiDelta` in order
//! and writes only what changed since the previous one.

use std::io::{self, Write};

use synapse_core::types::{SessionState, UiDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Human-readable streaming text.
    Text,
    /// One JSON object per delta.
    Json,
}

pub struct TerminalView<W: Write> {
    out: W,
    mode: ViewMode,
    /// Response text already written.
    shown: String,
    label: Option<String>,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W, mode: ViewMode) -> Self {
        Self {
            out,
            mode,
            shown: String::new(),
            label: None,
        }
    }

    /// Forget the previous session's output.
    pub fn reset(&mut self) {
        self.shown.clear();
        self.label = None;
    }

    pub fn render(&mut self, delta: &UiDelta) -> io::Result<()> {
        match self.mode {
            ViewMode::Json => {
                let line = serde_json::to_string(delta).map_err(io::Error::other)?;
                writeln!(self.out, "{}", line)?;
            }
            ViewMode::Text => self.render_text(delta)?,
        }
        self.out.flush()
    }

    fn render_text(&mut self, delta: &UiDelta) -> io::Result<()> {
        match &delta.state {
            SessionState::Idle => {}
            SessionState::Thinking { label } => {
                if self.label.as_deref() != Some(label.as_str()) && !label.is_empty() {
                    writeln!(self.out, "  ... {}", label)?;
                }
                self.label = Some(label.clone());
            }
            SessionState::Responding => self.write_text(&delta.accumulated_text)?,
            SessionState::Done => {
                self.write_text(&delta.accumulated_text)?;
                writeln!(self.out)?;
            }
            SessionState::Error { message } => {
                if !self.shown.is_empty() {
                    writeln!(self.out)?;
                }
                writeln!(self.out, "error: {}", message)?;
            }
        }
        Ok(())
    }

    /// Write the unseen suffix, or the whole text if it was replaced.
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        if let Some(suffix) = text.strip_prefix(self.shown.as_str()) {
            write!(self.out, "{}", suffix)?;
        } else {
            writeln!(self.out)?;
            write!(self.out, "{}", text)?;
        }
        self.shown = text.to_string();
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}
