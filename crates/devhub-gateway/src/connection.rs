//! Plugin connection trait and the channel-backed implementation
//!
//! The gateway never calls into a plugin synchronously: `send` hands the
//! envelope to whatever channel reaches the plugin process and returns.
//! Replies come back later through `RequestRouter::on_reply`, events through
//! `EventBroker::on_plugin_event`. The channel implementation here backs
//! in-process plugins (the daemon's demo plugin, tests); other transports
//! implement the same trait.

use async_trait::async_trait;
use tokio::sync::mpsc;

use devhub_core::DispatchEnvelope;

/// Errors crossing the plugin connection boundary
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The plugin side of the channel is gone
    #[error("connection closed")]
    Closed,

    /// Transport-specific send failure
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Transport-agnostic handle for reaching one plugin
#[async_trait]
pub trait PluginConnection: Send + Sync {
    /// Queue an envelope toward the plugin. Returning `Ok` means the
    /// envelope was accepted for delivery, not that the plugin handled it.
    async fn send(&self, envelope: DispatchEnvelope) -> Result<(), ConnectionError>;

    /// Best-effort cancellation of an outstanding request. The router never
    /// waits for this; plugins may ignore it entirely.
    async fn cancel(&self, correlation_id: u64) {
        let _ = correlation_id;
    }

    /// Whether the transport currently considers itself usable
    fn is_connected(&self) -> bool {
        true
    }
}

/// Message seen by the plugin side of a [`ChannelConnection`]
#[derive(Debug, Clone)]
pub enum PluginMessage {
    Dispatch(DispatchEnvelope),
    Cancel(u64),
}

/// In-process connection backed by a bounded mpsc channel
pub struct ChannelConnection {
    tx: mpsc::Sender<PluginMessage>,
}

impl ChannelConnection {
    /// Create a connection and the receiver the plugin task consumes
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PluginMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PluginConnection for ChannelConnection {
    async fn send(&self, envelope: DispatchEnvelope) -> Result<(), ConnectionError> {
        self.tx
            .send(PluginMessage::Dispatch(envelope))
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn cancel(&self, correlation_id: u64) {
        // Dropped silently if the plugin is gone; cancellation is advisory
        let _ = self.tx.try_send(PluginMessage::Cancel(correlation_id));
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}
