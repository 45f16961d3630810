//! Status transition policy.
//!
//! Pure decision logic: given the previously persisted status and the
//! status observed by the current tick, decide whether an alert is due.
//! Steady states never alert, which is what keeps a persistently dead
//! host from producing an alert storm.

use chrono::{DateTime, Utc};

use crate::db::models::{MonitoredTarget, TargetStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Target just entered DOWN.
    Down,
    /// Target came back UP after being DOWN.
    Recovery,
    /// The probe faulted and the previous status was not already ERROR.
    ProbeFailure,
}

/// Decide whether the transition `previous -> current` warrants an alert.
pub fn decide(previous: TargetStatus, current: TargetStatus) -> Option<AlertKind> {
    match current {
        TargetStatus::Error if previous != TargetStatus::Error => Some(AlertKind::ProbeFailure),
        TargetStatus::Down if previous != TargetStatus::Down => Some(AlertKind::Down),
        TargetStatus::Up if previous == TargetStatus::Down => Some(AlertKind::Recovery),
        _ => None,
    }
}

/// Render the alert text for a decided transition. Down and failure
/// alerts carry the prior status so the receiving side can show what
/// changed.
pub fn format_alert(
    kind: AlertKind,
    target: &MonitoredTarget,
    previous: TargetStatus,
    at: DateTime<Utc>,
) -> String {
    let timestamp = at.format("%Y-%m-%d %H:%M:%S UTC");
    match kind {
        AlertKind::Down => format!(
            "🚨 ALERT: Host {} ({}) is DOWN! (was {}, {})",
            target.name, target.hostname, previous, timestamp
        ),
        AlertKind::Recovery => format!(
            "✅ RECOVERY: Host {} ({}) is back UP. (was {}, {})",
            target.name, target.hostname, previous, timestamp
        ),
        AlertKind::ProbeFailure => format!(
            "⚠️ ERROR: Check for host {} ({}) failed. (was {}, {})",
            target.name, target.hostname, previous, timestamp
        ),
    }
}
