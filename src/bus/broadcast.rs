//! In-process bus backed by tokio broadcast channels, one per channel
//! name. Senders are created lazily on first publish or subscribe.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

use super::{BusError, BusSubscription, MessageBus};

const CHANNEL_CAPACITY: usize = 256;

pub struct BroadcastBus {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(tx) = self.channels.read().unwrap_or_else(|e| e.into_inner()).get(channel) {
            return tx.clone();
        }
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for BroadcastBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        // A send error only means nobody is subscribed right now; that
        // is a normal state for a bus, not a failure.
        let _ = self.sender_for(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, BusError> {
        Ok(BusSubscription::new(self.sender_for(channel).subscribe()))
    }
}
