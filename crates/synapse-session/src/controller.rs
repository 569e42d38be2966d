//! Session controller.
//!
//! Owns the one active session: validates and submits input, spawns the
//! driver task that is the sole caller of the reducer, and exposes the
//! resulting `UiDelta` sequence through a `SessionHandle`.

use std::sync::Arc;
use std::time::Duration;

use synapse_core::config::SessionConfig;
use synapse_core::types::{Event, UiDelta};
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::error::SessionError;
use crate::reducer::{reduce, Effect, Session};
use crate::transport::{Transport, TransportHandle};

const CANCELLED: &str = "cancelled";
const TIMEOUT: &str = "timeout";
const CONNECTION_CLOSED: &str = "connection closed";

/// Caller's view of one submitted session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    deltas: mpsc::UnboundedReceiver<UiDelta>,
    snapshot: watch::Receiver<UiDelta>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next snapshot, in reduction order. `None` after the terminal one.
    pub async fn next_delta(&mut self) -> Option<UiDelta> {
        self.deltas.recv().await
    }

    /// Most recent snapshot, without consuming the sequence.
    pub fn latest(&self) -> UiDelta {
        self.snapshot.borrow().clone()
    }

    /// Wait until the session is terminal and return its final snapshot.
    pub async fn wait_terminal(&mut self) -> UiDelta {
        let terminal = match self.snapshot.wait_for(UiDelta::is_terminal).await {
            Ok(delta) => Some(delta.clone()),
            Err(_) => None,
        };
        terminal.unwrap_or_else(|| self.snapshot.borrow().clone())
    }

    /// Consume the handle as a `Stream` of snapshots.
    pub fn into_stream(self) -> UnboundedReceiverStream<UiDelta> {
        UnboundedReceiverStream::new(self.deltas)
    }
}

struct ActiveSession {
    id: Uuid,
    snapshot: watch::Receiver<UiDelta>,
    cancel: Arc<Notify>,
    driver: JoinHandle<()>,
}

impl ActiveSession {
    fn is_terminal(&self) -> bool {
        self.snapshot.borrow().is_terminal()
    }
}

/// Runs at most one session at a time over a single transport.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    watchdog: Duration,
    max_message_length: usize,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn Transport>, config: &SessionConfig) -> Self {
        Self {
            transport,
            watchdog: Duration::from_secs(config.watchdog_secs),
            max_message_length: config.max_message_length,
            active: Mutex::new(None),
        }
    }

    /// Override the watchdog interval.
    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Submit user input and start a new session.
    ///
    /// A terminal previous session is discarded. The session is installed
    /// before the transport is opened, so a concurrent `submit` fails with
    /// `AlreadyPending` while the submission is still in flight. Opening
    /// happens on the driver task under the watchdog; a transport that fails
    /// to open ends the session in `Error`.
    pub async fn submit(&self, user_text: &str) -> Result<SessionHandle, SessionError> {
        if user_text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if user_text.chars().count() > self.max_message_length {
            return Err(SessionError::MessageTooLong(self.max_message_length));
        }

        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if !current.is_terminal() {
                return Err(SessionError::AlreadyPending(current.id));
            }
        }

        let id = Uuid::new_v4();
        let kind = self.transport.kind();
        let (snapshot_tx, snapshot_rx) = watch::channel(UiDelta::idle());
        let (delta_tx, delta_rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(Notify::new());

        let driver = tokio::spawn(drive(
            Driver {
                session: Session::new(id, kind),
                deltas: delta_tx,
                snapshot: snapshot_tx,
            },
            Arc::clone(&self.transport),
            user_text.to_string(),
            Arc::clone(&cancel),
            self.watchdog,
        ));

        tracing::info!(session_id = %id, transport = %kind, "Session submitted");

        *active = Some(ActiveSession {
            id,
            snapshot: snapshot_rx.clone(),
            cancel,
            driver,
        });

        Ok(SessionHandle {
            id,
            deltas: delta_rx,
            snapshot: snapshot_rx,
        })
    }

    /// Cancel the session behind `handle`.
    ///
    /// Returns once the session is observably terminal. A session that
    /// already finished keeps its outcome.
    pub async fn cancel(&self, handle: &SessionHandle) {
        let mut snapshot = {
            let active = self.active.lock().await;
            let Some(current) = active.as_ref().filter(|a| a.id == handle.id) else {
                return;
            };
            if current.is_terminal() {
                return;
            }
            current.cancel.notify_one();
            current.snapshot.clone()
        };

        let _ = snapshot.wait_for(UiDelta::is_terminal).await;
    }

    /// Discard the session behind `handle` if it is terminal.
    ///
    /// Returns whether the session was discarded.
    pub async fn acknowledge(&self, handle: &SessionHandle) -> bool {
        let mut active = self.active.lock().await;
        match active.as_ref() {
            Some(current) if current.id == handle.id && current.is_terminal() => {
                tracing::debug!(session_id = %current.id, "Session acknowledged");
                *active = None;
                true
            }
            _ => false,
        }
    }

    /// Latest snapshot of the active session, if any.
    pub async fn current(&self) -> Option<UiDelta> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|current| current.snapshot.borrow().clone())
    }

    /// Whether a non-terminal session exists.
    pub async fn is_busy(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|current| !current.is_terminal())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(current) = self.active.get_mut().take() {
            current.driver.abort();
        }
    }
}

/// Sole owner of a session's state while it runs.
struct Driver {
    session: Session,
    deltas: mpsc::UnboundedSender<UiDelta>,
    snapshot: watch::Sender<UiDelta>,
}

impl Driver {
    /// Reduce one event and carry out its effects.
    fn apply(&mut self, event: Event, mut transport: Option<&mut TransportHandle>) {
        tracing::trace!(session_id = %self.session.id, event = event.kind(), "Reducing event");
        for effect in reduce(&mut self.session, event) {
            match effect {
                Effect::Terminate => {
                    if let Some(transport) = transport.as_deref_mut() {
                        transport.close();
                    }
                }
                Effect::Emit(delta) => {
                    self.snapshot.send_replace(delta.clone());
                    let _ = self.deltas.send(delta);
                }
                Effect::Warn(warning) => {
                    tracing::warn!(session_id = %self.session.id, warning = %warning, "Protocol warning");
                }
            }
        }
    }

    fn finish(&self) {
        tracing::info!(
            session_id = %self.session.id,
            state = %self.session.state,
            text_len = self.session.accumulated_text.len(),
            "Session finished"
        );
    }
}

/// Open the transport and drive one session to a terminal state.
///
/// The watchdog is armed before the transport is opened and covers both
/// the submission and the response.
async fn drive(
    mut driver: Driver,
    transport: Arc<dyn Transport>,
    input: String,
    cancel: Arc<Notify>,
    watchdog: Duration,
) {
    let id = driver.session.id;
    let deadline = tokio::time::sleep(watchdog);
    tokio::pin!(deadline);

    // Dropping a pending `open` releases whatever it had claimed
    let opened = tokio::select! {
        biased;
        _ = cancel.notified() => {
            tracing::info!(session_id = %id, "Session cancelled while opening");
            Err(Event::error(CANCELLED))
        }
        _ = &mut deadline => {
            tracing::warn!(session_id = %id, watchdog_secs = watchdog.as_secs(), "Session watchdog expired while opening");
            Err(Event::error(TIMEOUT))
        }
        result = transport.open(id, &input) => result.map_err(|e| {
            tracing::warn!(session_id = %id, error = %e, "Transport failed to open");
            Event::error(e.to_string())
        }),
    };

    let mut handle = match opened {
        Ok(handle) => handle,
        Err(event) => {
            driver.apply(event, None);
            driver.finish();
            return;
        }
    };

    while !driver.session.is_terminal() {
        let event = tokio::select! {
            biased;
            _ = cancel.notified() => {
                tracing::info!(session_id = %id, "Session cancelled");
                handle.close();
                Event::error(CANCELLED)
            }
            _ = &mut deadline => {
                tracing::warn!(session_id = %id, watchdog_secs = watchdog.as_secs(), "Session watchdog expired");
                Event::error(TIMEOUT)
            }
            event = handle.next_event() => match event {
                Some(event) => event,
                None => Event::error(CONNECTION_CLOSED),
            },
        };
        driver.apply(event, Some(&mut handle));
    }

    driver.finish();
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use synapse_core::config::TransportKind;
    use synapse_core::types::SessionState;
    use tokio_stream::StreamExt;

    use crate::transport::EVENT_BUFFER;

    /// Transport whose events are pushed by the test.
    #[derive(Default)]
    struct FakeTransport {
        sender: std::sync::Mutex<Option<mpsc::Sender<Event>>>,
        fail_with: std::sync::Mutex<Option<String>>,
        stall: AtomicBool,
        opens: AtomicUsize,
        closes: Arc<AtomicUsize>,
    }

    impl FakeTransport {
        /// Opening runs on the driver task, so wait for it to happen.
        async fn wait_opened(&self) -> mpsc::Sender<Event> {
            for _ in 0..500 {
                if let Some(tx) = self.sender.lock().unwrap().clone() {
                    return tx;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            panic!("transport was never opened");
        }

        async fn emit(&self, event: Event) {
            let tx = self.wait_opened().await;
            tx.send(event).await.unwrap();
        }

        fn hang_up(&self) {
            self.sender.lock().unwrap().take();
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Pull
        }

        async fn open(&self, _id: Uuid, _input: &str) -> Result<TransportHandle, SessionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.stall.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if let Some(message) = self.fail_with.lock().unwrap().clone() {
                return Err(SessionError::Transport(message));
            }
            let (tx, rx) = mpsc::channel(EVENT_BUFFER);
            *self.sender.lock().unwrap() = Some(tx);
            let closes = Arc::clone(&self.closes);
            Ok(TransportHandle::new(rx).on_close(move || {
                closes.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    fn controller(fake: &Arc<FakeTransport>) -> SessionController {
        let transport: Arc<dyn Transport> = Arc::clone(fake) as Arc<dyn Transport>;
        SessionController::new(transport, &SessionConfig::default())
    }

    // =====================================================================
    // Submission
    // =====================================================================

    #[tokio::test]
    async fn test_session_runs_to_done() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake);
        let handle = controller.submit("What is the capital of France?").await.unwrap();

        fake.emit(Event::thinking("analyzing")).await;
        fake.emit(Event::token("Paris")).await;
        fake.emit(Event::done()).await;

        let deltas: Vec<UiDelta> = handle.into_stream().collect().await;
        let states: Vec<&str> = deltas.iter().map(|d| d.state.name()).collect();
        assert_eq!(states, vec!["thinking", "responding", "done"]);
        assert_eq!(deltas.last().unwrap().accumulated_text, "Paris");
        assert_eq!(fake.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_submit_while_pending_fails() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake);
        let mut first = controller.submit("first").await.unwrap();

        fake.emit(Event::thinking("working")).await;
        assert_eq!(
            first.next_delta().await.unwrap().state,
            SessionState::Thinking {
                label: "working".to_string()
            }
        );

        match controller.submit("second").await {
            Err(SessionError::AlreadyPending(id)) => assert_eq!(id, first.id()),
            other => panic!("expected AlreadyPending, got {:?}", other.map(|h| h.id())),
        }
        assert_eq!(fake.opens.load(Ordering::SeqCst), 1);

        // First session is untouched and still completes
        fake.emit(Event::token("still here")).await;
        fake.emit(Event::done()).await;
        let last = first.wait_terminal().await;
        assert_eq!(last.state, SessionState::Done);
        assert_eq!(last.accumulated_text, "still here");
    }

    #[tokio::test]
    async fn test_submit_after_terminal_replaces_session() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake);
        let mut first = controller.submit("first").await.unwrap();
        fake.emit(Event::error("db down")).await;
        first.wait_terminal().await;

        let second = controller.submit("second").await.unwrap();
        assert_ne!(second.id(), first.id());
        assert_eq!(controller.current().await, Some(UiDelta::idle()));
        assert!(!controller.acknowledge(&first).await);
    }

    #[tokio::test]
    async fn test_input_validation() {
        let fake = Arc::new(FakeTransport::default());
        let controller = SessionController::new(
            Arc::clone(&fake) as Arc<dyn Transport>,
            &SessionConfig {
                watchdog_secs: 120,
                max_message_length: 10,
            },
        );

        assert!(matches!(
            controller.submit("").await,
            Err(SessionError::EmptyMessage)
        ));
        assert!(matches!(
            controller.submit("  \n\t").await,
            Err(SessionError::EmptyMessage)
        ));
        assert!(matches!(
            controller.submit("this is far too long").await,
            Err(SessionError::MessageTooLong(10))
        ));
        // Length counts characters, not bytes
        assert!(controller.submit("\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}").await.is_ok());
        fake.wait_opened().await;
        assert_eq!(fake.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_failure_becomes_error_session() {
        let fake = Arc::new(FakeTransport::default());
        *fake.fail_with.lock().unwrap() = Some("connection refused".to_string());
        let controller = controller(&fake);

        let mut handle = controller.submit("hello").await.unwrap();
        let delta = handle.next_delta().await.unwrap();
        assert_eq!(
            delta.state,
            SessionState::Error {
                message: "transport error: connection refused".to_string()
            }
        );
        assert_eq!(handle.next_delta().await, None);
        assert!(!controller.is_busy().await);
    }

    #[tokio::test]
    async fn test_transport_ending_without_terminal_is_error() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake);
        let mut handle = controller.submit("hello").await.unwrap();

        fake.emit(Event::thinking("t")).await;
        fake.emit(Event::token("half")).await;
        fake.hang_up();

        let last = handle.wait_terminal().await;
        assert_eq!(
            last.state,
            SessionState::Error {
                message: CONNECTION_CLOSED.to_string()
            }
        );
        assert_eq!(last.accumulated_text, "half");
    }

    #[tokio::test]
    async fn test_submit_while_opening_fails_without_waiting() {
        let fake = Arc::new(FakeTransport::default());
        fake.stall.store(true, Ordering::SeqCst);
        let controller = controller(&fake);
        let first = controller.submit("first").await.unwrap();

        let second = tokio::time::timeout(Duration::from_secs(1), controller.submit("second"))
            .await
            .expect("submit must not queue behind an open in progress");
        match second {
            Err(SessionError::AlreadyPending(id)) => assert_eq!(id, first.id()),
            other => panic!("expected AlreadyPending, got {:?}", other.map(|h| h.id())),
        }
        assert!(controller.is_busy().await);
        assert_eq!(controller.current().await, Some(UiDelta::idle()));
    }

    // =====================================================================
    // Watchdog
    // =====================================================================

    #[tokio::test]
    async fn test_watchdog_expiry_times_out_session() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake).with_watchdog(Duration::from_millis(50));
        let mut handle = controller.submit("hello").await.unwrap();

        fake.emit(Event::thinking("slow")).await;
        let last = handle.wait_terminal().await;
        assert_eq!(
            last.state,
            SessionState::Error {
                message: TIMEOUT.to_string()
            }
        );
        assert_eq!(fake.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watchdog_disarmed_after_done() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake).with_watchdog(Duration::from_millis(50));
        let mut handle = controller.submit("hello").await.unwrap();

        fake.emit(Event::done_with("fast")).await;
        assert_eq!(handle.wait_terminal().await.state, SessionState::Done);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let current = controller.current().await.unwrap();
        assert_eq!(current.state, SessionState::Done);
        assert_eq!(current.accumulated_text, "fast");
    }

    #[tokio::test]
    async fn test_watchdog_covers_open() {
        let fake = Arc::new(FakeTransport::default());
        fake.stall.store(true, Ordering::SeqCst);
        let controller = controller(&fake).with_watchdog(Duration::from_millis(50));
        let mut handle = controller.submit("hello").await.unwrap();

        let last = tokio::time::timeout(Duration::from_secs(2), handle.wait_terminal())
            .await
            .expect("watchdog fires while the transport is still opening");
        assert_eq!(
            last.state,
            SessionState::Error {
                message: TIMEOUT.to_string()
            }
        );
        assert!(!controller.is_busy().await);
    }

    // =====================================================================
    // Cancellation
    // =====================================================================

    #[tokio::test]
    async fn test_cancel_preserves_partial_text() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake);
        let mut handle = controller.submit("hello").await.unwrap();

        fake.emit(Event::thinking("t")).await;
        fake.emit(Event::token("partial")).await;
        handle.next_delta().await.unwrap();
        handle.next_delta().await.unwrap();

        controller.cancel(&handle).await;

        let latest = handle.latest();
        assert_eq!(
            latest.state,
            SessionState::Error {
                message: CANCELLED.to_string()
            }
        );
        assert_eq!(latest.accumulated_text, "partial");
        assert_eq!(fake.closes.load(Ordering::SeqCst), 1);

        // Terminal delta then end of sequence
        assert!(handle.next_delta().await.unwrap().is_terminal());
        assert_eq!(handle.next_delta().await, None);
    }

    #[tokio::test]
    async fn test_cancel_after_done_keeps_outcome() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake);
        let mut handle = controller.submit("hello").await.unwrap();

        fake.emit(Event::done_with("answer")).await;
        handle.wait_terminal().await;
        controller.cancel(&handle).await;

        assert_eq!(handle.latest().state, SessionState::Done);
        assert_eq!(handle.latest().accumulated_text, "answer");
    }

    #[tokio::test]
    async fn test_cancel_while_opening() {
        let fake = Arc::new(FakeTransport::default());
        fake.stall.store(true, Ordering::SeqCst);
        let controller = controller(&fake);
        let mut handle = controller.submit("hello").await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), controller.cancel(&handle))
            .await
            .expect("cancel completes while the transport is still opening");
        assert_eq!(
            handle.latest().state,
            SessionState::Error {
                message: CANCELLED.to_string()
            }
        );
        assert!(handle.next_delta().await.unwrap().is_terminal());
        assert_eq!(handle.next_delta().await, None);
        assert!(controller.acknowledge(&handle).await);
    }

    #[tokio::test]
    async fn test_acknowledge_only_discards_terminal_sessions() {
        let fake = Arc::new(FakeTransport::default());
        let controller = controller(&fake);
        let mut handle = controller.submit("hello").await.unwrap();

        assert!(!controller.acknowledge(&handle).await);
        assert!(controller.is_busy().await);

        fake.emit(Event::done()).await;
        handle.wait_terminal().await;
        assert!(controller.acknowledge(&handle).await);
        assert_eq!(controller.current().await, None);
        assert!(!controller.is_busy().await);
    }
}
