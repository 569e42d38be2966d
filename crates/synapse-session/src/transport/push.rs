//! Push transport: a persistent WebSocket carrying status messages, with
//! submissions sent over a separate HTTP request.
//!
//! The socket is shared by every submission the adapter ever carries, so
//! inbound messages are routed through a single in-flight slot. Holding the
//! slot is what makes a concurrent `open` fail with `AlreadyPending`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use synapse_core::config::{SynapseConfig, TransportKind};
use synapse_core::types::{Event, SubmitRequest};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::{Transport, TransportHandle, EVENT_BUFFER};
use crate::classify::classify_push;
use crate::error::SessionError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SOCKET_CLOSED: &str = "push socket closed";

struct InFlight {
    id: Uuid,
    tx: mpsc::Sender<Event>,
}

/// State shared between the adapter and its listener task.
struct Shared {
    slot: Mutex<Option<InFlight>>,
    connected: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            connected: AtomicBool::new(true),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        // The slot holds no invariant a panicking holder could break
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the slot for `id`, returning the receiving end of its channel.
    fn claim(&self, id: Uuid) -> Result<mpsc::Receiver<Event>, SessionError> {
        let mut slot = self.slot();
        if let Some(current) = slot.as_ref() {
            return Err(SessionError::AlreadyPending(current.id));
        }
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        *slot = Some(InFlight { id, tx });
        Ok(rx)
    }

    /// Free the slot if `id` still holds it.
    fn release(&self, id: Uuid) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|current| current.id == id) {
            *slot = None;
            tracing::trace!(session_id = %id, "Push slot released");
        }
    }

    fn current(&self) -> Option<(Uuid, mpsc::Sender<Event>)> {
        self.slot()
            .as_ref()
            .map(|current| (current.id, current.tx.clone()))
    }

    /// Route one inbound text message to the in-flight submission.
    async fn route(&self, text: &str) {
        let event = match classify_push(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping push message");
                return;
            }
        };

        let Some((id, tx)) = self.current() else {
            tracing::debug!(event = event.kind(), "Push message with no submission in flight, dropped");
            return;
        };

        let terminal = event.is_terminal();
        if tx.send(event).await.is_err() {
            tracing::debug!(session_id = %id, "Push receiver gone, message dropped");
        }
        if terminal {
            self.release(id);
        }
    }

    /// Mark the socket dead and fail whatever is in flight.
    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let in_flight = self.slot().take();
        if let Some(in_flight) = in_flight {
            tracing::warn!(session_id = %in_flight.id, "Push socket closed with submission in flight");
            let _ = in_flight.tx.send(Event::error(SOCKET_CLOSED)).await;
        }
    }
}

/// Releases a claimed slot unless disarmed; covers early returns and a
/// dropped `open` future alike.
struct Claim<'a> {
    shared: &'a Shared,
    id: Uuid,
    armed: bool,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release(self.id);
        }
    }
}

/// Adapter for the WebSocket status channel plus its submission endpoint.
pub struct PushSocketAdapter {
    client: Client,
    submit_url: String,
    source: String,
    shared: Arc<Shared>,
    shutdown: Arc<Notify>,
    listener: JoinHandle<()>,
}

impl PushSocketAdapter {
    /// Connect the socket and start listening.
    pub async fn connect(
        socket_url: &str,
        submit_url: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let (socket, _) = connect_async(socket_url).await?;
        tracing::info!(url = %socket_url, "Push socket connected");

        let shared = Arc::new(Shared::new());
        let shutdown = Arc::new(Notify::new());
        let listener = tokio::spawn(listen(socket, Arc::clone(&shared), Arc::clone(&shutdown)));

        Ok(Self {
            client: Client::new(),
            submit_url: submit_url.into(),
            source: source.into(),
            shared,
            shutdown,
            listener,
        })
    }

    pub async fn from_config(config: &SynapseConfig) -> Result<Self, SessionError> {
        Self::connect(
            config.socket_url()?.as_str(),
            config.endpoint(&config.transport.submit_path)?,
            config.transport.source.clone(),
        )
        .await
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Id of the submission currently holding the slot.
    pub fn in_flight(&self) -> Option<Uuid> {
        self.shared.current().map(|(id, _)| id)
    }

    /// Close the socket. Any in-flight submission ends with an error.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for PushSocketAdapter {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl Transport for PushSocketAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    async fn open(&self, id: Uuid, input: &str) -> Result<TransportHandle, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::Disconnected);
        }

        let rx = self.shared.claim(id)?;
        let mut claim = Claim {
            shared: &self.shared,
            id,
            armed: true,
        };

        let body = SubmitRequest {
            user_input: input.to_string(),
            source: self.source.clone(),
        };
        let response = self.client.post(&self.submit_url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(session_id = %id, status = %status, "Push submission rejected");
            return Err(SessionError::Transport(format!(
                "submission rejected with status {}",
                status
            )));
        }

        claim.armed = false;
        tracing::debug!(session_id = %id, "Push submission accepted");

        let shared = Arc::clone(&self.shared);
        Ok(TransportHandle::new(rx).on_close(move || shared.release(id)))
    }
}

async fn listen(mut socket: Socket, shared: Arc<Shared>, shutdown: Arc<Notify>) {
    loop {
        let message = tokio::select! {
            message = socket.next() => message,
            _ = shutdown.notified() => {
                tracing::info!("Push socket shutting down");
                let _ = socket.close(None).await;
                break;
            }
        };

        match message {
            Some(Ok(Message::Text(text))) => shared.route(text.as_str()).await,
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(frame = ?frame, "Push socket closed by server");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Push socket error");
                break;
            }
            None => break,
        }
    }

    shared.disconnect().await;
}
