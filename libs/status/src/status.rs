//! Status types for racks, tasks and devices.

use chrono::{DateTime, Utc};
use rackwatch_id::{DeviceKey, RackKey, TaskKey};
use serde::{Deserialize, Serialize};

// =============================================================================
// Variant
// =============================================================================

/// Severity classification of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Neutral information.
    #[default]
    Info,
    /// The entity is healthy and doing what it should.
    Success,
    /// The entity is degraded or its state cannot be confirmed.
    Warning,
    /// The entity has failed.
    Error,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Variant::Info => "info",
            Variant::Success => "success",
            Variant::Warning => "warning",
            Variant::Error => "error",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Status
// =============================================================================

/// A status report for one entity.
///
/// `D` carries the entity-specific details; see [`RackStatus`],
/// [`TaskStatus`] and [`DeviceStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status<D> {
    /// Identifier of the status report.
    #[serde(default)]
    pub key: String,

    /// Severity.
    pub variant: Variant,

    /// Short human readable message.
    #[serde(default)]
    pub message: String,

    /// Optional longer description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// When the status was produced. Defaults to the Unix epoch when absent.
    #[serde(default)]
    pub time: DateTime<Utc>,

    /// Entity-specific details.
    pub details: D,
}

impl<D> Status<D> {
    /// Creates a status stamped with the current time.
    pub fn new(key: impl Into<String>, variant: Variant, message: impl Into<String>, details: D) -> Self {
        Self {
            key: key.into(),
            variant,
            message: message.into(),
            description: String::new(),
            time: Utc::now(),
            details,
        }
    }

    /// Replaces severity and message, restamping the time.
    pub fn degrade(&mut self, variant: Variant, message: impl Into<String>) {
        self.variant = variant;
        self.message = message.into();
        self.time = Utc::now();
    }
}

/// Details of a rack status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RackDetails {
    /// The rack this status describes.
    pub rack: RackKey,
}

/// Details of a task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetails {
    /// The task this status describes.
    pub task: TaskKey,

    /// Whether the task is currently executing on its rack.
    #[serde(default)]
    pub running: bool,
}

/// Details of a device status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    /// The rack the device is attached to.
    pub rack: RackKey,

    /// The device this status describes.
    pub device: DeviceKey,
}

pub type RackStatus = Status<RackDetails>;
pub type TaskStatus = Status<TaskDetails>;
pub type DeviceStatus = Status<DeviceDetails>;

// =============================================================================
// Unknown States
// =============================================================================

impl Status<RackDetails> {
    /// Status of a rack that has never been observed.
    pub fn unknown(rack: RackKey) -> Self {
        Self::new(
            rack.to_string(),
            Variant::Warning,
            "Rack state unknown",
            RackDetails { rack },
        )
    }
}

impl Status<TaskDetails> {
    /// Status of a task that has never been observed.
    pub fn unknown(task: TaskKey) -> Self {
        Self::new(
            task.to_string(),
            Variant::Warning,
            "Task state unknown",
            TaskDetails {
                task,
                running: false,
            },
        )
    }
}

impl Status<DeviceDetails> {
    /// Status of a device that has never been observed.
    pub fn unknown(device: DeviceKey, rack: RackKey) -> Self {
        Self::new(
            device.to_string(),
            Variant::Warning,
            "Device state unknown",
            DeviceDetails { rack, device },
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rackwatch_id::NodeKey;
    use rstest::rstest;

    #[rstest]
    #[case(Variant::Info, "\"info\"")]
    #[case(Variant::Success, "\"success\"")]
    #[case(Variant::Warning, "\"warning\"")]
    #[case(Variant::Error, "\"error\"")]
    fn test_variant_serialization(#[case] variant: Variant, #[case] expected: &str) {
        assert_eq!(serde_json::to_string(&variant).unwrap(), expected);
        assert_eq!(variant.to_string(), expected.trim_matches('"'));
    }

    #[test]
    fn test_unknown_rack_status() {
        let rack = RackKey::new(NodeKey::from_raw(1), 1);
        let status = RackStatus::unknown(rack);
        assert_eq!(status.variant, Variant::Warning);
        assert!(status.message.contains("unknown"));
        assert_eq!(status.details.rack, rack);
        assert_eq!(status.key, rack.to_string());
    }

    #[test]
    fn test_unknown_task_is_not_running() {
        let task = TaskKey::new(RackKey::from_raw(65537), 1);
        let status = TaskStatus::unknown(task);
        assert!(!status.details.running);
        assert_eq!(status.variant, Variant::Warning);
    }

    #[test]
    fn test_task_status_from_minimal_payload() {
        let payload = r#"{"variant":"error","message":"Task is in error","details":{"task":"281479271677953"}}"#;
        let status: TaskStatus = serde_json::from_str(payload).unwrap();
        assert_eq!(status.variant, Variant::Error);
        assert_eq!(status.details.task.rack(), RackKey::from_raw(65537));
        assert!(!status.details.running);
        assert_eq!(status.time, DateTime::<Utc>::default());
    }

    #[test]
    fn test_device_status_requires_rack() {
        let payload = r#"{"variant":"info","details":{"device":"dev1"}}"#;
        assert!(serde_json::from_str::<DeviceStatus>(payload).is_err());
    }

    #[test]
    fn test_degrade_restamps_time() {
        let mut status = RackStatus::new("r", Variant::Info, "alive", RackDetails { rack: RackKey::from_raw(1) });
        status.time = DateTime::<Utc>::default();
        status.degrade(Variant::Warning, "stale");
        assert_eq!(status.variant, Variant::Warning);
        assert_eq!(status.message, "stale");
        assert!(status.time > DateTime::<Utc>::default());
    }
}
