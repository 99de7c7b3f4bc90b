//! Typed key definitions for tracked entities.

use crate::define_key;

// =============================================================================
// Integer Keys
// =============================================================================

define_key!(NodeKey, u16, "node");
define_key!(RackKey, u32, "rack");
define_key!(TaskKey, u64, "task", string);
define_key!(ChannelKey, u32, "channel");

impl RackKey {
    /// Composes a rack key from its owning node and the node-local sequence.
    #[must_use]
    pub const fn new(node: NodeKey, local: u16) -> Self {
        Self(((node.raw() as u32) << 16) | local as u32)
    }

    /// Returns the node that owns this rack.
    #[must_use]
    pub const fn node(&self) -> NodeKey {
        NodeKey::from_raw((self.0 >> 16) as u16)
    }

    /// Returns the node-local sequence of this rack.
    #[must_use]
    pub const fn local(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl TaskKey {
    /// Composes a task key from its owning rack and the rack-local sequence.
    #[must_use]
    pub const fn new(rack: RackKey, local: u32) -> Self {
        Self(((rack.raw() as u64) << 32) | local as u64)
    }

    /// Returns the rack that owns this task.
    #[must_use]
    pub const fn rack(&self) -> RackKey {
        RackKey::from_raw((self.0 >> 32) as u32)
    }

    /// Returns the rack-local sequence of this task.
    #[must_use]
    pub const fn local(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

// =============================================================================
// Device Key
// =============================================================================

/// Key of a peripheral device. Devices are identified by a vendor-assigned
/// string (serial number, VISA resource name, OPC endpoint, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    /// Entity name used in error messages.
    pub const KIND: &'static str = "device";

    /// Creates a device key, rejecting empty strings.
    pub fn parse(s: &str) -> Result<Self, crate::KeyError> {
        if s.is_empty() {
            return Err(crate::KeyError::Empty { kind: Self::KIND });
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceKey {
    type Err = crate::KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<&str> for DeviceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DeviceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Tests
// =============================================================================
