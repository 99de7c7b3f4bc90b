//! Tracker configuration.

use std::sync::Arc;
use std::time::Duration;

use rackwatch_id::NodeKey;
use rackwatch_status::Codec;

use crate::bus::StatusBus;
use crate::channels::ChannelProvisioner;
use crate::directory::{DeviceDirectory, RackDirectory, TaskDirectory};
use crate::error::TrackerError;
use crate::store::KeyValueStore;

/// Default time after which a silent rack is considered dead.
pub const DEFAULT_ALIVE_THRESHOLD: Duration = Duration::from_secs(3);

/// Default capacity of each persistence queue.
pub const DEFAULT_PERSIST_QUEUE: usize = 10;

/// Tunable tracker settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    /// Node whose racks are loaded at startup and which leases the status
    /// channels.
    pub host: NodeKey,

    /// Racks silent for longer than this are degraded.
    pub alive_threshold: Duration,

    /// Capacity of each persistence queue.
    pub persist_queue_capacity: usize,

    /// Batches the publisher buffers before producers wait.
    pub publish_buffer: usize,

    /// Batches buffered per change-feed and status-topic subscription.
    pub feed_buffer: usize,

    /// Encoding of status payloads and persisted statuses.
    pub codec: Codec,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            host: NodeKey::from_raw(1),
            alive_threshold: DEFAULT_ALIVE_THRESHOLD,
            persist_queue_capacity: DEFAULT_PERSIST_QUEUE,
            publish_buffer: 8,
            feed_buffer: 64,
            codec: Codec::Json,
        }
    }
}

impl TrackerSettings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, TrackerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings from an arbitrary variable source. Unset variables keep
    /// their defaults; malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TrackerError> {
        let mut settings = Self::default();

        if let Some(host) = lookup("RACKWATCH_HOST_NODE") {
            settings.host = host
                .parse()
                .map_err(|e| invalid("RACKWATCH_HOST_NODE", &host, e))?;
        }
        if let Some(threshold) = lookup("RACKWATCH_ALIVE_THRESHOLD") {
            settings.alive_threshold = humantime::parse_duration(&threshold)
                .map_err(|e| invalid("RACKWATCH_ALIVE_THRESHOLD", &threshold, e))?;
        }
        if let Some(capacity) = lookup("RACKWATCH_PERSIST_QUEUE") {
            settings.persist_queue_capacity = capacity
                .parse()
                .map_err(|e| invalid("RACKWATCH_PERSIST_QUEUE", &capacity, e))?;
        }
        if let Some(buffer) = lookup("RACKWATCH_PUBLISH_BUFFER") {
            settings.publish_buffer = buffer
                .parse()
                .map_err(|e| invalid("RACKWATCH_PUBLISH_BUFFER", &buffer, e))?;
        }
        if let Some(buffer) = lookup("RACKWATCH_FEED_BUFFER") {
            settings.feed_buffer = buffer
                .parse()
                .map_err(|e| invalid("RACKWATCH_FEED_BUFFER", &buffer, e))?;
        }
        if let Some(codec) = lookup("RACKWATCH_CODEC") {
            settings.codec = codec
                .parse()
                .map_err(|e| invalid("RACKWATCH_CODEC", &codec, e))?;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings the tracker cannot run with.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.alive_threshold.is_zero() {
            return Err(TrackerError::InvalidConfig(
                "alive threshold must be positive".to_string(),
            ));
        }
        let capacities = [
            ("persist queue capacity", self.persist_queue_capacity),
            ("publish buffer", self.publish_buffer),
            ("feed buffer", self.feed_buffer),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(TrackerError::InvalidConfig(format!(
                    "{name} must be positive"
                )));
            }
        }
        Ok(())
    }
}

fn invalid(var: &str, value: &str, err: impl std::fmt::Display) -> TrackerError {
    TrackerError::InvalidConfig(format!("{var}={value:?}: {err}"))
}

/// Settings plus the collaborators the tracker runs against.
#[derive(Clone)]
pub struct Config {
    pub settings: TrackerSettings,
    pub racks: Arc<dyn RackDirectory>,
    pub tasks: Arc<dyn TaskDirectory>,
    pub devices: Arc<dyn DeviceDirectory>,
    pub store: Arc<dyn KeyValueStore>,
    pub channels: Arc<dyn ChannelProvisioner>,
    pub bus: Arc<dyn StatusBus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = TrackerSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, TrackerSettings::default());
        assert_eq!(settings.alive_threshold, Duration::from_secs(3));
        assert_eq!(settings.persist_queue_capacity, 10);
    }

    #[test]
    fn test_overrides() {
        let settings = TrackerSettings::from_lookup(lookup(&[
            ("RACKWATCH_HOST_NODE", "7"),
            ("RACKWATCH_ALIVE_THRESHOLD", "1500ms"),
            ("RACKWATCH_CODEC", "msgpack"),
            ("RACKWATCH_FEED_BUFFER", "4"),
        ]))
        .unwrap();
        assert_eq!(settings.host, NodeKey::from_raw(7));
        assert_eq!(settings.alive_threshold, Duration::from_millis(1500));
        assert_eq!(settings.codec, Codec::MsgPack);
        assert_eq!(settings.feed_buffer, 4);
    }

    #[rstest::rstest]
    #[case("RACKWATCH_ALIVE_THRESHOLD", "soon")]
    #[case("RACKWATCH_ALIVE_THRESHOLD", "0s")]
    #[case("RACKWATCH_PERSIST_QUEUE", "0")]
    #[case("RACKWATCH_PUBLISH_BUFFER", "-1")]
    #[case("RACKWATCH_CODEC", "xml")]
    #[case("RACKWATCH_HOST_NODE", "70000")]
    fn test_invalid_values(#[case] var: &str, #[case] value: &str) {
        let err = TrackerSettings::from_lookup(lookup(&[(var, value)])).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidConfig(_)));
    }
}
