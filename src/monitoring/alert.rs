//! Alert publication.
//!
//! All alert categories share one transport channel; the category is a
//! routing prefix the downstream notifier resolves to an actual
//! delivery destination. Pushing the name instead of a destination id
//! lets destinations be remapped without touching the agent.

use std::sync::Arc;
use tracing::{error, info};

use crate::bus::MessageBus;

/// Fixed transport channel all alert categories share.
pub const ALERT_CHANNEL: &str = "bot_alerts";

pub struct AlertDispatcher {
    bus: Arc<dyn MessageBus>,
}

impl AlertDispatcher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Publish `message` under the given routing category. Publish
    /// failures are logged and swallowed; a lost alert must never abort
    /// the check tick that produced it.
    pub async fn dispatch(&self, category: &str, message: &str) {
        let payload = format!("{category}|{message}");
        match self.bus.publish(ALERT_CHANNEL, &payload).await {
            Ok(()) => info!(category = category, message = message, "Dispatched alert"),
            Err(e) => error!(category = category, error = %e, "Failed to dispatch alert"),
        }
    }
}
