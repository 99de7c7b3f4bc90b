//! Live status ingestion.

use chrono::{DateTime, Utc};
use rackwatch_status::{Codec, DeviceStatus, RackStatus, Status, TaskStatus};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{is_synthesized, SharedCache};
use crate::ingest::drive;
use crate::persist::PersistQueues;

type Payloads = Vec<Vec<u8>>;

/// Applies statuses streamed by racks to the cache.
///
/// Payloads are decoded before the cache lock is taken. Statuses the tracker
/// published itself are recognised by their key and ignored, so the
/// tracker's own warnings never count as a sign of life.
#[derive(Clone)]
pub struct LiveStatusIngestor {
    cache: SharedCache,
    persist: PersistQueues,
    codec: Codec,
}

impl LiveStatusIngestor {
    pub fn new(cache: SharedCache, persist: PersistQueues, codec: Codec) -> Self {
        Self {
            cache,
            persist,
            codec,
        }
    }

    pub async fn run_racks(self, rx: mpsc::Receiver<Payloads>, shutdown: watch::Receiver<bool>) {
        drive("rack_status", rx, shutdown, |batch| self.apply_racks(batch)).await;
    }

    pub async fn run_tasks(self, rx: mpsc::Receiver<Payloads>, shutdown: watch::Receiver<bool>) {
        drive("task_status", rx, shutdown, |batch| self.apply_tasks(batch)).await;
    }

    pub async fn run_devices(self, rx: mpsc::Receiver<Payloads>, shutdown: watch::Receiver<bool>) {
        drive("device_status", rx, shutdown, |batch| self.apply_devices(batch)).await;
    }

    /// Rack reports overwrite the rack's status and mark it seen. Reports
    /// for untracked racks are skipped.
    pub async fn apply_racks(&self, payloads: Payloads) {
        let statuses: Vec<RackStatus> = self.decode_all("rack", &payloads);
        if statuses.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut cache = self.cache.write().await;
        for status in statuses {
            let rack = status.details.rack;
            let Some(entry) = cache.racks.get_mut(&rack) else {
                warn!(rack = %rack, "Rack not found for status update");
                continue;
            };
            entry.status = status;
            entry.last_seen = Some(now);
        }
    }

    /// Task reports are stored under their owning rack and queued for
    /// persistence. Reports whose rack is untracked are skipped.
    pub async fn apply_tasks(&self, payloads: Payloads) {
        let statuses: Vec<TaskStatus> = self.decode_all("task", &payloads);
        if statuses.is_empty() {
            return;
        }

        let mut updated = Vec::with_capacity(statuses.len());
        {
            let mut cache = self.cache.write().await;
            for status in statuses {
                let task = status.details.task;
                let Some(entry) = cache.racks.get_mut(&task.rack()) else {
                    warn!(task = %task, rack = %task.rack(), "Rack not found for task status update");
                    continue;
                };
                entry.tasks.insert(task, status);
                updated.push(task);
            }
        }

        for task in updated {
            self.persist.notify_task(task);
        }
    }

    /// Device reports are accepted unless the device is attached to a
    /// different rack than the one reporting it.
    pub async fn apply_devices(&self, payloads: Payloads) {
        let statuses: Vec<DeviceStatus> = self.decode_all("device", &payloads);
        if statuses.is_empty() {
            return;
        }

        let mut updated = Vec::with_capacity(statuses.len());
        {
            let mut cache = self.cache.write().await;
            for status in statuses {
                let device = status.details.device.clone();
                let incoming = status.details.rack;
                if let Some(existing) = cache.devices.get(&device) {
                    let owner = existing.details.rack;
                    if owner != incoming {
                        warn!(
                            device = %device,
                            incoming_rack = %incoming,
                            incoming_rack_name = %cache.rack_name(incoming),
                            owning_rack = %owner,
                            owning_rack_name = %cache.rack_name(owner),
                            "Rejected device status from a rack that does not own the device"
                        );
                        continue;
                    }
                }
                cache.devices.insert(device.clone(), status);
                updated.push(device);
            }
        }

        for device in updated {
            self.persist.notify_device(device);
        }
    }

    fn decode_all<D: DeserializeOwned>(&self, kind: &'static str, payloads: &Payloads) -> Vec<Status<D>> {
        payloads
            .iter()
            .filter_map(|payload| match self.codec.decode::<Status<D>>(payload) {
                Ok(status) if is_synthesized(&status.key) => {
                    debug!(kind, key = %status.key, "Ignoring status published by the tracker");
                    None
                }
                Ok(mut status) => {
                    if status.time == DateTime::<Utc>::default() {
                        status.time = Utc::now();
                    }
                    Some(status)
                }
                Err(e) => {
                    warn!(kind, error = %e, "Failed to decode status");
                    None
                }
            })
            .collect()
    }
}
