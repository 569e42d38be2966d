//! Streaming assistant sessions.
//!
//! Raw transport bytes or socket messages are framed, classified into
//! `Event`s, and reduced into one session lifecycle whose snapshots are
//! published as `UiDelta`s.

pub mod classify;
pub mod controller;
pub mod error;
pub mod frame;
pub mod reducer;
pub mod transport;

pub use classify::{classify_frame, classify_line, classify_push};
pub use controller::{SessionController, SessionHandle};
pub use error::{ProtocolError, SessionError};
pub use frame::{Frame, FrameDecoder};
pub use reducer::{reduce, Effect, ProtocolWarning, Session};
pub use transport::{PullStreamAdapter, PushSocketAdapter, Transport, TransportHandle};

use std::sync::Arc;

use synapse_core::config::{SynapseConfig, TransportKind};

/// Build the transport selected by `config.transport.kind`.
///
/// The push transport connects its socket here.
pub async fn transport_from_config(
    config: &SynapseConfig,
) -> Result<Arc<dyn Transport>, SessionError> {
    let transport: Arc<dyn Transport> = match config.transport.kind {
        TransportKind::Pull => Arc::new(PullStreamAdapter::from_config(config)?),
        TransportKind::Push => Arc::new(PushSocketAdapter::from_config(config).await?),
    };
    Ok(transport)
}
