//! Well-known status channels and their provisioning.
//!
//! The tracker owns four channels: one status channel per entity kind and the
//! task command channel (provisioned here, written by other components).
//! Provisioning is expressed as a [`ProvisionBatch`] that a
//! [`ChannelProvisioner`] applies atomically.

use async_trait::async_trait;
use rackwatch_id::{ChannelKey, NodeKey};
use thiserror::Error;

/// Streamed task statuses.
pub const TASK_STATUS_CHANNEL: &str = "sy_task_status";
/// Streamed rack statuses.
pub const RACK_STATUS_CHANNEL: &str = "sy_rack_status";
/// Streamed device statuses.
pub const DEVICE_STATUS_CHANNEL: &str = "sy_device_status";
/// Commands issued to tasks.
pub const TASK_COMMAND_CHANNEL: &str = "sy_task_cmd";

/// Channel superseded by rack status payloads.
pub const RETIRED_HEARTBEAT_CHANNEL: &str = "sy_rack_heartbeat";

/// Legacy channel names and their replacements.
pub const LEGACY_RENAMES: [(&str, &str); 3] = [
    ("sy_device_state", DEVICE_STATUS_CHANNEL),
    ("sy_rack_state", RACK_STATUS_CHANNEL),
    ("sy_task_state", TASK_STATUS_CHANNEL),
];

/// Errors from channel provisioning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// A rename target is already taken by another channel.
    #[error("cannot rename channel '{from}' to '{to}': name already in use")]
    NameConflict { from: String, to: String },

    /// The requested channel definition is not acceptable.
    #[error("invalid channel '{name}': {reason}")]
    Invalid { name: String, reason: String },

    /// The provisioner could not apply the batch.
    #[error("provisioning unavailable: {0}")]
    Unavailable(String),
}

/// Desired properties of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub data_type: String,
    pub leaseholder: NodeKey,
    /// Virtual channels stream data without persisting it.
    pub is_virtual: bool,
    /// Internal channels are hidden from end users.
    pub internal: bool,
}

impl ChannelSpec {
    /// A virtual, internal JSON channel leased to `leaseholder`.
    pub fn internal_json(name: impl Into<String>, leaseholder: NodeKey) -> Self {
        Self {
            name: name.into(),
            data_type: "json".to_string(),
            leaseholder,
            is_virtual: true,
            internal: true,
        }
    }
}

/// A provisioned channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub key: ChannelKey,
    pub spec: ChannelSpec,
}

/// An atomic set of provisioning operations.
///
/// Applied in order: deletes, renames, then create-or-update of each spec.
/// Deletes and renames of absent names are no-ops. Specs whose name exists are
/// retrieved and overwritten only where their properties differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionBatch {
    pub deletes: Vec<String>,
    pub renames: Vec<(String, String)>,
    pub specs: Vec<ChannelSpec>,
}

impl ProvisionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete(mut self, name: impl Into<String>) -> Self {
        self.deletes.push(name.into());
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.push((from.into(), to.into()));
        self
    }

    pub fn ensure(mut self, spec: ChannelSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// The batch the tracker applies at startup.
    pub fn status_channels(host: NodeKey) -> Self {
        let mut batch = Self::new().delete(RETIRED_HEARTBEAT_CHANNEL);
        for (from, to) in LEGACY_RENAMES {
            batch = batch.rename(from, to);
        }
        [
            TASK_STATUS_CHANNEL,
            RACK_STATUS_CHANNEL,
            DEVICE_STATUS_CHANNEL,
            TASK_COMMAND_CHANNEL,
        ]
        .into_iter()
        .fold(batch, |batch, name| {
            batch.ensure(ChannelSpec::internal_json(name, host))
        })
    }
}

/// Creates, renames and deletes channels.
#[async_trait]
pub trait ChannelProvisioner: Send + Sync {
    /// Applies the batch atomically, returning one channel per spec in order.
    async fn provision(&self, batch: ProvisionBatch) -> Result<Vec<Channel>, ProvisionError>;
}

/// Keys of the channels provisioned at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChannels {
    pub task_status: ChannelKey,
    pub rack_status: ChannelKey,
    pub device_status: ChannelKey,
    pub task_command: ChannelKey,
}

impl StatusChannels {
    /// Resolves the result of [`ProvisionBatch::status_channels`].
    pub fn from_provisioned(channels: &[Channel]) -> Result<Self, ProvisionError> {
        let find = |name: &str| {
            channels
                .iter()
                .find(|c| c.spec.name == name)
                .map(|c| c.key)
                .ok_or_else(|| ProvisionError::Invalid {
                    name: name.to_string(),
                    reason: "missing from provisioning result".to_string(),
                })
        };
        Ok(Self {
            task_status: find(TASK_STATUS_CHANNEL)?,
            rack_status: find(RACK_STATUS_CHANNEL)?,
            device_status: find(DEVICE_STATUS_CHANNEL)?,
            task_command: find(TASK_COMMAND_CHANNEL)?,
        })
    }

    /// Channels the tracker writes synthesized statuses to.
    pub fn writable(&self) -> [ChannelKey; 3] {
        [self.task_status, self.rack_status, self.device_status]
    }
}
