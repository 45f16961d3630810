//! Persistence contract for monitored targets.
//!
//! The scheduler only ever needs three operations: list the active
//! subset, look one target up by id, and write back the result of a
//! check. Everything else (CRUD, assignment) belongs to the admin
//! component and is out of scope here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{MonitoredTarget, MonitoredTargetRow, TargetStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All targets with `is_active = true`.
    async fn list_active_targets(&self) -> Result<Vec<MonitoredTarget>, StoreError>;

    async fn find_target(&self, id: i64) -> Result<Option<MonitoredTarget>, StoreError>;

    /// Persist the outcome of one check tick.
    async fn save_status(
        &self,
        id: i64,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Postgres-backed implementation over the `monitored_targets` table.
#[derive(Clone)]
pub struct PgTargetStore {
    pool: Arc<PgPool>,
}

impl PgTargetStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetStore for PgTargetStore {
    async fn list_active_targets(&self) -> Result<Vec<MonitoredTarget>, StoreError> {
        let rows = sqlx::query_as::<_, MonitoredTargetRow>(
            "SELECT id, name, hostname, interval_seconds, is_active, last_status, last_check \
             FROM monitored_targets WHERE is_active = TRUE",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(MonitoredTarget::from).collect())
    }

    async fn find_target(&self, id: i64) -> Result<Option<MonitoredTarget>, StoreError> {
        let row = sqlx::query_as::<_, MonitoredTargetRow>(
            "SELECT id, name, hostname, interval_seconds, is_active, last_status, last_check \
             FROM monitored_targets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(MonitoredTarget::from))
    }

    async fn save_status(
        &self,
        id: i64,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE monitored_targets SET last_status = $2, last_check = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(checked_at)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }
}
