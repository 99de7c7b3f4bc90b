//! Structural records owned by the structural database.

use rackwatch_id::{DeviceKey, RackKey, TaskKey};
use serde::{Deserialize, Serialize};

/// A controller process running on a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rack {
    pub key: RackKey,
    pub name: String,
}

/// A unit of configured work executed by a rack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub key: TaskKey,
    pub name: String,

    /// Driver specific task type (e.g. `ni_analog_read`).
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Snapshots are frozen copies of a task's configuration. They never
    /// execute and are not tracked.
    #[serde(default)]
    pub snapshot: bool,
}

impl Task {
    /// Returns the rack that executes this task.
    pub fn rack(&self) -> RackKey {
        self.key.rack()
    }
}

/// A physical peripheral attached to a rack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub key: DeviceKey,
    pub rack: RackKey,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
}
