//! Durable status persistence.
//!
//! The tracker persists only the latest status of each task and device so
//! it can report something meaningful immediately after a restart. Statuses
//! are stored as codec-encoded blobs under namespaced keys:
//!
//! - `task_status/<task key>`
//! - `device_status/<device key>`
//!
//! Two implementations are provided: an in-memory map for tests and
//! development, and a SQLite-backed store for durability across restarts.

mod memory;
mod sqlite;

use async_trait::async_trait;
use rackwatch_id::{DeviceKey, TaskKey};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors from status store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true if the key was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Key-value storage for encoded statuses.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value. Absent keys yield [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Inserts or replaces a value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
}

/// Store key of a task's persisted status.
pub fn task_status_key(task: TaskKey) -> String {
    format!("task_status/{}", task)
}

/// Store key of a device's persisted status.
pub fn device_status_key(device: &DeviceKey) -> String {
    format!("device_status/{}", device)
}
