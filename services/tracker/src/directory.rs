//! Structural directory contracts for racks, tasks and devices.
//!
//! The directories are the authoritative structural database. The tracker
//! reads them once at startup and then follows their change feeds.

use async_trait::async_trait;
use rackwatch_id::{DeviceKey, NodeKey, RackKey, TaskKey};
use rackwatch_status::{Device, Rack, Task};
use thiserror::Error;

use crate::feed::ChangeFeed;

/// Errors from structural directories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory could not serve the request.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Rack records and their changes.
#[async_trait]
pub trait RackDirectory: ChangeFeed<RackKey, Rack> {
    /// Lists the racks owned by a cluster node.
    async fn list_by_node(&self, node: NodeKey) -> Result<Vec<Rack>, DirectoryError>;
}

/// Task records and their changes.
#[async_trait]
pub trait TaskDirectory: ChangeFeed<TaskKey, Task> {
    /// Lists the tasks configured on a rack, snapshots included.
    async fn list_by_rack(&self, rack: RackKey) -> Result<Vec<Task>, DirectoryError>;
}

/// Device records and their changes.
#[async_trait]
pub trait DeviceDirectory: ChangeFeed<DeviceKey, Device> {
    /// Lists every device in the cluster.
    async fn list_all(&self) -> Result<Vec<Device>, DirectoryError>;
}
