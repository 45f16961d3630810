use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Reachability status of a monitored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Up,
    Down,
    /// The probe itself faulted (e.g. hostname resolution failure).
    Error,
    /// Never checked, or the stored value was unrecognized.
    Unknown,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Up => "UP",
            TargetStatus::Down => "DOWN",
            TargetStatus::Error => "ERROR",
            TargetStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn from_db(value: Option<&str>) -> Self {
        match value {
            Some("UP") => TargetStatus::Up,
            Some("DOWN") => TargetStatus::Down,
            Some("ERROR") => TargetStatus::Error,
            _ => TargetStatus::Unknown,
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host that is periodically health-checked.
///
/// Owned by the external admin component; the scheduler only reads the
/// active subset and writes back `last_status` / `last_checked_at`.
#[derive(Debug, Clone)]
pub struct MonitoredTarget {
    pub id: i64,
    pub name: String,
    pub hostname: String,
    pub interval_seconds: i32,
    pub is_active: bool,
    pub last_status: TargetStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Raw row shape of the `monitored_targets` table. Several columns are
/// nullable in the schema; defaults are applied when mapping to the
/// domain model.
#[derive(Debug, Clone, FromRow)]
pub struct MonitoredTargetRow {
    pub id: i64,
    pub name: String,
    pub hostname: String,
    pub interval_seconds: Option<i32>,
    pub is_active: Option<bool>,
    pub last_status: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
}

impl From<MonitoredTargetRow> for MonitoredTarget {
    fn from(row: MonitoredTargetRow) -> Self {
        MonitoredTarget {
            id: row.id,
            name: row.name,
            hostname: row.hostname,
            interval_seconds: row.interval_seconds.unwrap_or(0),
            is_active: row.is_active.unwrap_or(false),
            last_status: TargetStatus::from_db(row.last_status.as_deref()),
            last_checked_at: row.last_check,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_strings() {
        for status in [
            TargetStatus::Up,
            TargetStatus::Down,
            TargetStatus::Error,
            TargetStatus::Unknown,
        ] {
            assert_eq!(TargetStatus::from_db(Some(status.as_str())), status);
        }
    }

    #[test]
    fn unrecognized_status_maps_to_unknown() {
        assert_eq!(TargetStatus::from_db(Some("flapping")), TargetStatus::Unknown);
        assert_eq!(TargetStatus::from_db(None), TargetStatus::Unknown);
    }

    #[test]
    fn nullable_columns_get_defaults() {
        let row = MonitoredTargetRow {
            id: 7,
            name: "edge-router".to_string(),
            hostname: "10.1.1.1".to_string(),
            interval_seconds: None,
            is_active: None,
            last_status: None,
            last_check: None,
        };
        let target = MonitoredTarget::from(row);
        assert_eq!(target.interval_seconds, 0);
        assert!(!target.is_active);
        assert_eq!(target.last_status, TargetStatus::Unknown);
    }
}
