//! Structural change ingestion.

use std::time::Duration;

use rackwatch_id::{DeviceKey, RackKey, TaskKey};
use rackwatch_status::{
    Device, DeviceDetails, DeviceStatus, Rack, Task, TaskDetails, TaskStatus, Variant,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{synthesized_key, unknown_rack_warning, SharedCache};
use crate::feed::{Change, ChangeVariant};
use crate::ingest::drive;
use crate::publisher::{PublisherHandle, StatusBatch};

/// Applies rack, task and device create/update/delete events to the cache.
#[derive(Clone)]
pub struct ChangeIngestor {
    cache: SharedCache,
    publisher: PublisherHandle,
    alive_threshold: Duration,
}

impl ChangeIngestor {
    pub fn new(cache: SharedCache, publisher: PublisherHandle, alive_threshold: Duration) -> Self {
        Self {
            cache,
            publisher,
            alive_threshold,
        }
    }

    pub async fn run_racks(
        self,
        rx: mpsc::Receiver<Vec<Change<RackKey, Rack>>>,
        shutdown: watch::Receiver<bool>,
    ) {
        drive("rack_changes", rx, shutdown, |batch| self.apply_racks(batch)).await;
    }

    pub async fn run_tasks(
        self,
        rx: mpsc::Receiver<Vec<Change<TaskKey, Task>>>,
        shutdown: watch::Receiver<bool>,
    ) {
        drive("task_changes", rx, shutdown, |batch| self.apply_tasks(batch)).await;
    }

    pub async fn run_devices(
        self,
        rx: mpsc::Receiver<Vec<Change<DeviceKey, Device>>>,
        shutdown: watch::Receiver<bool>,
    ) {
        drive("device_changes", rx, shutdown, |batch| self.apply_devices(batch)).await;
    }

    /// Rack deletes drop the entry with its tasks; sets create an unknown
    /// entry if absent and refresh the display name.
    pub async fn apply_racks(&self, batch: Vec<Change<RackKey, Rack>>) {
        let now = Instant::now();
        let mut cache = self.cache.write().await;

        for change in batch {
            match change.variant {
                ChangeVariant::Delete => {
                    if let Some(entry) = cache.racks.remove(&change.key) {
                        info!(
                            rack = %change.key,
                            tasks = entry.tasks.len(),
                            "Stopped tracking deleted rack"
                        );
                    }
                }
                ChangeVariant::Set => {
                    let name = change.value.map(|rack| rack.name).unwrap_or_default();
                    let (entry, created) = cache.ensure_rack(change.key, now);
                    if !name.is_empty() {
                        entry.name = name;
                    }
                    if created {
                        info!(rack = %change.key, name = %entry.name, "Tracking new rack");
                    }
                }
            }
        }
    }

    /// Task sets ensure the task (and its rack) are tracked. If the rack is
    /// new or not alive, a warning status is synthesized, cached and
    /// published.
    pub async fn apply_tasks(&self, batch: Vec<Change<TaskKey, Task>>) {
        let now = Instant::now();
        let mut warnings = Vec::new();

        {
            let mut cache = self.cache.write().await;
            for change in batch {
                let task = change.key;
                let rack = task.rack();

                if change.variant == ChangeVariant::Delete {
                    if let Some(entry) = cache.racks.get_mut(&rack) {
                        entry.tasks.remove(&task);
                    }
                    continue;
                }
                if change.value.as_ref().is_some_and(|t| t.snapshot) {
                    debug!(task = %task, "Skipping snapshot task");
                    continue;
                }

                let (entry, created) = cache.ensure_rack(rack, now);
                entry
                    .tasks
                    .entry(task)
                    .or_insert_with(|| TaskStatus::unknown(task));

                if created || !entry.is_alive(self.alive_threshold, now) {
                    let message = if created {
                        unknown_rack_warning(rack)
                    } else {
                        entry.configure_warning(now)
                    };
                    let status = TaskStatus::new(
                        task.to_string(),
                        Variant::Warning,
                        message,
                        TaskDetails {
                            task,
                            running: false,
                        },
                    );
                    let mut published = status.clone();
                    published.key = synthesized_key(task);
                    entry.tasks.insert(task, status);
                    warnings.push(published);
                }
            }
        }

        if !warnings.is_empty() {
            debug!(count = warnings.len(), "Tasks configured on racks that are not alive");
            self.publisher
                .publish(StatusBatch {
                    tasks: warnings,
                    ..Default::default()
                })
                .await;
        }
    }

    /// Device deletes drop the entry. Sets register first-sight devices and
    /// refresh the rack attachment of known ones, keeping their reported
    /// state.
    pub async fn apply_devices(&self, batch: Vec<Change<DeviceKey, Device>>) {
        let mut cache = self.cache.write().await;

        for change in batch {
            let key = change.key;
            let device = match (change.variant, change.value) {
                (ChangeVariant::Delete, _) => {
                    cache.devices.remove(&key);
                    continue;
                }
                (ChangeVariant::Set, Some(device)) => device,
                (ChangeVariant::Set, None) => {
                    warn!(device = %key, "Device change without a record");
                    continue;
                }
            };

            match cache.devices.get_mut(&key) {
                Some(existing) => {
                    if existing.details.rack != device.rack {
                        info!(
                            device = %key,
                            from = %existing.details.rack,
                            to = %device.rack,
                            "Device moved to another rack"
                        );
                    }
                    existing.details.rack = device.rack;
                    existing.details.device = key;
                    existing.time = chrono::Utc::now();
                }
                None => {
                    let status = DeviceStatus::new(
                        key.to_string(),
                        Variant::Info,
                        "Device registered",
                        DeviceDetails {
                            rack: device.rack,
                            device: key.clone(),
                        },
                    );
                    cache.devices.insert(key, status);
                }
            }
        }
    }
}
