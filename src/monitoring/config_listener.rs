//! Configuration-change events.
//!
//! The admin side announces target changes by publishing a marker on
//! the events channel; anything else on the channel is logged and
//! ignored. One bad message never takes the subscription down.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::{BusError, MessageBus};
use crate::monitoring::scheduler::MonitorScheduler;

pub const EVENTS_CHANNEL: &str = "netadmin_events";
pub const CONFIG_UPDATE_MARKER: &str = "CONFIG_UPDATE:MONITORING";

/// Subscribe to the events channel and drive scheduler refreshes from
/// it. The returned handle cancels the subscription loop when aborted
/// or dropped at shutdown.
pub async fn start(
    bus: Arc<dyn MessageBus>,
    scheduler: Arc<MonitorScheduler>,
) -> Result<JoinHandle<()>, BusError> {
    let mut subscription = bus.subscribe(EVENTS_CHANNEL).await?;

    Ok(tokio::spawn(async move {
        loop {
            match subscription.recv().await {
                Ok(message) => {
                    info!(message = %message, "Received config event");
                    if message == CONFIG_UPDATE_MARKER {
                        scheduler.refresh().await;
                    } else {
                        warn!(message = %message, "Ignoring unrecognized config event");
                    }
                }
                Err(BusError::Lagged(dropped)) => {
                    // Missed markers are recovered by the next one; a
                    // refresh is a full rebuild either way.
                    warn!(dropped = dropped, "Config event subscriber lagged");
                }
                Err(e) => {
                    warn!(error = %e, "Config event channel closed, listener exiting");
                    break;
                }
            }
        }
    }))
}
