//! Pull transport: one `POST` per submission, response body read as a
//! chunked line stream.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use synapse_core::config::{SynapseConfig, TransportKind};
use synapse_core::types::{Event, SubmitRequest};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Transport, TransportHandle, EVENT_BUFFER};
use crate::classify::classify_frame;
use crate::error::SessionError;
use crate::frame::{Frame, FrameDecoder};

/// Adapter for the streaming chat endpoint.
#[derive(Debug, Clone)]
pub struct PullStreamAdapter {
    client: Client,
    url: String,
    source: String,
}

impl PullStreamAdapter {
    pub fn new(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url, source)
    }

    pub fn with_client(client: Client, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn from_config(config: &SynapseConfig) -> Result<Self, SessionError> {
        Ok(Self::new(
            config.endpoint(&config.transport.stream_path)?,
            config.transport.source.clone(),
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for PullStreamAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Pull
    }

    async fn open(&self, id: Uuid, input: &str) -> Result<TransportHandle, SessionError> {
        let body = SubmitRequest {
            user_input: input.to_string(),
            source: self.source.clone(),
        };
        let request = self.client.post(&self.url).json(&body);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(read_stream(id, request, tx));

        tracing::debug!(session_id = %id, url = %self.url, "Pull stream opened");
        Ok(TransportHandle::new(rx).with_task(task))
    }
}

/// Send the request and forward classified events until the body ends.
///
/// Every exit path either delivers a terminal event or finds the receiver
/// gone.
async fn read_stream(id: Uuid, request: RequestBuilder, tx: mpsc::Sender<Event>) {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "Pull request failed");
            let _ = tx.send(Event::error(format!("request failed: {}", e))).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(session_id = %id, status = %status, "Pull request rejected");
        let _ = tx
            .send(Event::error(format!("server returned {}", status)))
            .await;
        return;
    }

    let mut body = response.bytes_stream();
    let mut decoder = FrameDecoder::new();
    let mut frames = 0usize;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Pull stream read failed");
                let _ = tx.send(Event::error(format!("stream interrupted: {}", e))).await;
                return;
            }
        };
        tracing::trace!(session_id = %id, len = chunk.len(), "Chunk received");

        for frame in decoder.feed(&chunk) {
            frames += 1;
            if !forward(id, &frame, &tx).await {
                return;
            }
        }
    }

    if let Some(frame) = decoder.finish() {
        frames += 1;
        if !forward(id, &frame, &tx).await {
            return;
        }
    }

    tracing::debug!(session_id = %id, frames, "Pull stream ended");
    let _ = tx.send(Event::done()).await;
}

/// Classify one frame and send its event. Returns `false` once the
/// receiver has gone away.
async fn forward(id: Uuid, frame: &Frame, tx: &mpsc::Sender<Event>) -> bool {
    match classify_frame(frame) {
        Ok(Some(event)) => tx.send(event).await.is_ok(),
        Ok(None) => {
            tracing::trace!(session_id = %id, len = frame.len(), "Frame ignored");
            true
        }
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "Dropping unclassifiable frame");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_builds_stream_url() {
        let mut config = SynapseConfig::default();
        config.server.base_url = "http://brain.local:9000/".to_string();
        let adapter = PullStreamAdapter::from_config(&config).unwrap();
        assert_eq!(adapter.url(), "http://brain.local:9000/chat/stream");
        assert_eq!(adapter.kind(), TransportKind::Pull);
    }

    #[tokio::test]
    async fn test_unreachable_server_yields_error_event() {
        // Port 9 (discard) on localhost is closed in test environments
        let adapter = PullStreamAdapter::new("http://127.0.0.1:9/chat/stream", "test");
        let mut handle = adapter.open(Uuid::new_v4(), "hello").await.unwrap();

        match handle.next_event().await {
            Some(Event::Error { message }) => assert!(message.starts_with("request failed")),
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(handle.next_event().await, None);
    }
}
