//! Minimal publish/subscribe contract for the message bus the agent
//! shares with the rest of the deployment (bot, admin panel).
//!
//! Channels are addressed by name. Payloads are plain strings; the
//! alert channel additionally carries a `"<category>|<message>"` framing
//! applied by the dispatcher, not by the bus.

pub mod broadcast;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast as tokio_broadcast;

pub use broadcast::BroadcastBus;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Bus channel closed")]
    ChannelClosed,
    #[error("Subscriber lagged, {0} messages dropped")]
    Lagged(u64),
    #[error("Publish failed: {0}")]
    Publish(String),
}

/// A live subscription to one channel. Dropping it unsubscribes.
pub struct BusSubscription {
    rx: tokio_broadcast::Receiver<String>,
}

impl BusSubscription {
    pub(crate) fn new(rx: tokio_broadcast::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Next payload on the channel. `Lagged` means this subscriber fell
    /// behind and messages were dropped; the subscription stays usable.
    pub async fn recv(&mut self) -> Result<String, BusError> {
        match self.rx.recv().await {
            Ok(payload) => Ok(payload),
            Err(tokio_broadcast::error::RecvError::Lagged(n)) => Err(BusError::Lagged(n)),
            Err(tokio_broadcast::error::RecvError::Closed) => Err(BusError::ChannelClosed),
        }
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, BusError>;
}
