//! Shared status cache.
//!
//! The cache maps each rack to its latest status, liveness bookkeeping and
//! nested task statuses, plus a flat device map keyed independently of racks
//! because a device's rack attachment can change. One reader-writer lock
//! guards the whole cache; handlers never hold it across I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rackwatch_id::{DeviceKey, RackKey, TaskKey};
use rackwatch_status::{DeviceStatus, RackStatus, TaskStatus};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Prefix of the keys of statuses the tracker synthesizes itself.
pub const SYNTHESIZED_KEY_PREFIX: &str = "rackwatch.tracker:";

/// Key of a status synthesized by the tracker for `entity`.
pub fn synthesized_key(entity: impl std::fmt::Display) -> String {
    format!("{}{}", SYNTHESIZED_KEY_PREFIX, entity)
}

/// Returns true if the status key marks a status the tracker published.
pub fn is_synthesized(key: &str) -> bool {
    key.starts_with(SYNTHESIZED_KEY_PREFIX)
}

/// Cache handle shared by every worker.
pub type SharedCache = Arc<RwLock<StatusCache>>;

/// Everything known about one rack.
#[derive(Debug, Clone)]
pub struct RackEntry {
    /// Display name from the structural directory; empty if never seen.
    pub name: String,
    pub status: RackStatus,
    /// When the rack last reported a status; `None` until the first report.
    pub last_seen: Option<Instant>,
    /// When the tracker started tracking this entry.
    pub tracked_since: Instant,
    pub tasks: HashMap<TaskKey, TaskStatus>,
}

impl RackEntry {
    /// An entry whose state is unknown.
    pub fn unknown(key: RackKey, name: impl Into<String>, now: Instant) -> Self {
        Self {
            name: name.into(),
            status: RackStatus::unknown(key),
            last_seen: None,
            tracked_since: now,
            tasks: HashMap::new(),
        }
    }

    pub fn key(&self) -> RackKey {
        self.status.details.rack
    }

    /// A rack is alive if it reported less than `threshold` ago.
    pub fn is_alive(&self, threshold: Duration, now: Instant) -> bool {
        self.last_seen
            .is_some_and(|seen| now.saturating_duration_since(seen) < threshold)
    }

    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.key().to_string()
        } else {
            self.name.clone()
        }
    }

    /// Status message for a rack that failed the liveness check.
    pub fn not_alive_message(&self) -> String {
        format!("Driver on {} is not alive", self.display_name())
    }

    /// Status message for tasks and devices of a stale rack.
    pub fn not_running_message(&self, now: Instant) -> String {
        format!(
            "Driver on {} is not running. {}",
            self.display_name(),
            self.silence(now)
        )
    }

    /// Status message for a task configured on a stale rack.
    pub fn configure_warning(&self, now: Instant) -> String {
        format!(
            "Driver on {} is not running, so the task may fail to configure. {}",
            self.display_name(),
            self.silence(now)
        )
    }

    fn silence(&self, now: Instant) -> String {
        match self.last_seen {
            Some(seen) => format!(
                "Driver was last alive {} ago.",
                format_elapsed(now.saturating_duration_since(seen))
            ),
            None => format!(
                "Driver has not reported status in {}. Rack state unknown.",
                format_elapsed(now.saturating_duration_since(self.tracked_since))
            ),
        }
    }
}

/// Status message for a task configured on a rack the tracker has never seen.
pub fn unknown_rack_warning(rack: RackKey) -> String {
    format!(
        "Rack {} is not alive, so the task may fail to configure. Rack state unknown.",
        rack
    )
}

/// Formats an elapsed duration truncated to whole seconds.
pub fn format_elapsed(elapsed: Duration) -> String {
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}

/// The in-memory state of every tracked rack, task and device.
#[derive(Debug, Default)]
pub struct StatusCache {
    pub racks: HashMap<RackKey, RackEntry>,
    pub devices: HashMap<DeviceKey, DeviceStatus>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    /// Returns the entry for `key`, creating an unknown one if absent. The
    /// flag is true if the entry was created.
    pub fn ensure_rack(&mut self, key: RackKey, now: Instant) -> (&mut RackEntry, bool) {
        let mut created = false;
        let entry = self.racks.entry(key).or_insert_with(|| {
            created = true;
            RackEntry::unknown(key, String::new(), now)
        });
        (entry, created)
    }

    pub fn task(&self, key: TaskKey) -> Option<&TaskStatus> {
        self.racks.get(&key.rack())?.tasks.get(&key)
    }

    /// Display name of a rack, falling back to its key.
    pub fn rack_name(&self, key: RackKey) -> String {
        self.racks
            .get(&key)
            .map(RackEntry::display_name)
            .unwrap_or_else(|| key.to_string())
    }
}
