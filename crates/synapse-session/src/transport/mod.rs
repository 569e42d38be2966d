//! Transport adapters and the handle they hand back.
//!
//! Both wire shapes produce the same thing: an ordered, finite sequence of
//! classified `Event`s for one submission. The controller only ever sees a
//! `TransportHandle`.

pub mod pull;
pub mod push;

use async_trait::async_trait;
use synapse_core::config::TransportKind;
use synapse_core::types::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::SessionError;

pub use pull::PullStreamAdapter;
pub use push::PushSocketAdapter;

/// Capacity of the per-submission event channel.
pub(crate) const EVENT_BUFFER: usize = 32;

/// A way of delivering one assistant response as `Event`s.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which wire shape this adapter speaks.
    fn kind(&self) -> TransportKind;

    /// Submit `input` for the session `id` and return its event sequence.
    ///
    /// Fails with `AlreadyPending` if the adapter is still carrying another
    /// submission. Failures after this returns arrive as an `Error` event.
    async fn open(&self, id: Uuid, input: &str) -> Result<TransportHandle, SessionError>;
}

type Release = Box<dyn FnOnce() + Send>;

/// Owned, lazily consumed event sequence for one submission.
///
/// Closing (explicitly or by drop) stops the producer and releases any
/// adapter-side resources. Closing twice is a no-op.
pub struct TransportHandle {
    events: mpsc::Receiver<Event>,
    task: Option<JoinHandle<()>>,
    release: Option<Release>,
    closed: bool,
}

impl TransportHandle {
    pub fn new(events: mpsc::Receiver<Event>) -> Self {
        Self {
            events,
            task: None,
            release: None,
            closed: false,
        }
    }

    /// Attach the producer task; it is aborted on close.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Run `release` exactly once when the handle is closed.
    pub fn on_close(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Next event, or `None` once the sequence is exhausted or closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("closed", &self.closed)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}
