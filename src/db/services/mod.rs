pub mod target_service;

pub use target_service::{PgTargetStore, StoreError, TargetStore};
