//! Liveness monitor.
//!
//! Every alive-threshold period the monitor sweeps the cache for racks that
//! have not reported recently and degrades them, their tasks and the devices
//! attached to them to warnings. Everything degraded in one sweep is
//! published as a single batch.

use std::collections::HashMap;
use std::time::Duration;

use rackwatch_status::{Status, Variant};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::{synthesized_key, SharedCache, StatusCache};
use crate::publisher::{PublisherHandle, StatusBatch};

/// Periodic staleness sweep.
pub struct LivenessMonitor {
    cache: SharedCache,
    publisher: PublisherHandle,
    alive_threshold: Duration,
}

impl LivenessMonitor {
    pub fn new(cache: SharedCache, publisher: PublisherHandle, alive_threshold: Duration) -> Self {
        Self {
            cache,
            publisher,
            alive_threshold,
        }
    }

    /// Sweeps once per alive threshold until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            threshold_ms = self.alive_threshold.as_millis() as u64,
            "Starting liveness monitor"
        );

        let mut ticker = tokio::time::interval(self.alive_threshold);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Liveness monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let batch = {
            let mut cache = self.cache.write().await;
            sweep_stale(&mut cache, self.alive_threshold, Instant::now())
        };
        if batch.is_empty() {
            return;
        }
        debug!(
            racks = batch.racks.len(),
            tasks = batch.tasks.len(),
            devices = batch.devices.len(),
            "Racks not alive"
        );
        self.publisher.publish(batch).await;
    }
}

/// Degrades every rack that is not alive at `now`, together with its tasks
/// and attached devices, in place. Returns the degraded statuses.
pub fn sweep_stale(cache: &mut StatusCache, threshold: Duration, now: Instant) -> StatusBatch {
    let mut batch = StatusBatch::default();
    let mut stale = HashMap::new();

    for (key, entry) in cache.racks.iter_mut() {
        if entry.is_alive(threshold, now) {
            continue;
        }

        let rack_message = entry.not_alive_message();
        let message = entry.not_running_message(now);

        entry.status.degrade(Variant::Warning, rack_message);
        batch.racks.push(published(&entry.status, key));

        for (task, status) in entry.tasks.iter_mut() {
            status.degrade(Variant::Warning, message.clone());
            status.details.running = false;
            batch.tasks.push(published(status, task));
        }

        stale.insert(*key, message);
    }

    if !stale.is_empty() {
        for (device, status) in cache.devices.iter_mut() {
            let Some(message) = stale.get(&status.details.rack) else {
                continue;
            };
            status.degrade(Variant::Warning, message.clone());
            batch.devices.push(published(status, device));
        }
    }

    batch
}

/// Copy of a cached status to publish. The cached status keeps the entity key.
fn published<D: Clone>(status: &Status<D>, entity: impl std::fmt::Display) -> Status<D> {
    let mut status = status.clone();
    status.key = synthesized_key(entity);
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackwatch_id::{DeviceKey, NodeKey, RackKey, TaskKey};
    use rackwatch_status::{DeviceDetails, DeviceStatus, TaskStatus};

    const THRESHOLD: Duration = Duration::from_secs(3);

    fn rack(local: u16) -> RackKey {
        RackKey::new(NodeKey::from_raw(1), local)
    }

    fn device(key: &str, rack: RackKey) -> DeviceStatus {
        DeviceStatus::new(
            key,
            Variant::Success,
            "Device connected",
            DeviceDetails {
                rack,
                device: DeviceKey::from(key),
            },
        )
    }

    /// One stale rack with `tasks` tasks and `devices` devices, plus an
    /// alive rack with one task and one device.
    fn populated(tasks: u32, devices: usize, now: Instant) -> StatusCache {
        let mut cache = StatusCache::new();

        let (stale, _) = cache.ensure_rack(rack(1), now);
        stale.name = "bench".to_string();
        stale.last_seen = Some(now);
        for local in 0..tasks {
            let task = TaskKey::new(rack(1), local);
            let mut status = TaskStatus::unknown(task);
            status.details.running = true;
            stale.tasks.insert(task, status);
        }

        let (alive, _) = cache.ensure_rack(rack(2), now);
        alive.last_seen = Some(now + THRESHOLD);
        let task = TaskKey::new(rack(2), 0);
        alive.tasks.insert(task, TaskStatus::unknown(task));

        for i in 0..devices {
            let key = format!("stale-{i}");
            cache.devices.insert(key.as_str().into(), device(&key, rack(1)));
        }
        cache.devices.insert("alive".into(), device("alive", rack(2)));
        cache
    }

    #[rstest::rstest]
    #[case(0, 0)]
    #[case(1, 0)]
    #[case(3, 2)]
    fn test_one_batch_per_stale_rack(#[case] tasks: u32, #[case] devices: usize) {
        let now = Instant::now();
        let mut cache = populated(tasks, devices, now);
        let later = now + THRESHOLD + Duration::from_secs(2);

        let batch = sweep_stale(&mut cache, THRESHOLD, later);
        assert_eq!(batch.len(), 1 + tasks as usize + devices);

        let entry = &cache.racks[&rack(1)];
        assert_eq!(entry.status.variant, Variant::Warning);
        assert_eq!(entry.status.message, "Driver on bench is not alive");
        for status in entry.tasks.values() {
            assert_eq!(status.variant, Variant::Warning);
            assert!(!status.details.running);
            assert_eq!(
                status.message,
                "Driver on bench is not running. Driver was last alive 5s ago."
            );
        }

        assert_eq!(cache.devices[&DeviceKey::from("alive")].variant, Variant::Success);
        assert_eq!(
            cache.racks[&rack(2)].tasks[&TaskKey::new(rack(2), 0)].message,
            "Task state unknown"
        );
    }

    #[test]
    fn test_sweep_keeps_cached_keys() {
        let now = Instant::now();
        let mut cache = populated(1, 1, now);
        let task = TaskKey::new(rack(1), 0);

        let batch = sweep_stale(&mut cache, THRESHOLD, now + THRESHOLD);

        let entry = &cache.racks[&rack(1)];
        assert_eq!(entry.status.key, rack(1).to_string());
        assert_eq!(entry.tasks[&task].key, task.to_string());
        assert_eq!(cache.devices[&DeviceKey::from("stale-0")].key, "stale-0");

        assert_eq!(batch.racks[0].key, synthesized_key(rack(1)));
        assert_eq!(batch.tasks[0].key, synthesized_key(task));
        assert_eq!(batch.devices[0].key, synthesized_key("stale-0"));
    }

    #[test]
    fn test_nothing_stale_yields_empty_batch() {
        let now = Instant::now();
        let mut cache = StatusCache::new();
        cache.ensure_rack(rack(1), now).0.last_seen = Some(now);
        assert!(sweep_stale(&mut cache, THRESHOLD, now).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_once_per_tick() {
        let cache = StatusCache::new().into_shared();
        cache.write().await.ensure_rack(rack(1), Instant::now());

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = LivenessMonitor::new(
            cache.clone(),
            PublisherHandle::from_sender(tx),
            THRESHOLD,
        );
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.racks.len(), 1);
        assert!(batch.racks[0].message.contains("is not alive"));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
