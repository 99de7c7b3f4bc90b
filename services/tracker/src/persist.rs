//! Persistence debouncer.
//!
//! Ingestors notify the debouncer of the keys whose status changed. Each
//! entity kind has one bounded queue and one consumer; enqueueing never
//! blocks and drops the notification when the queue is full. Consumers
//! re-read the current cached status before writing it, so a dropped
//! notification is repaired by the next one for the same key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rackwatch_id::{DeviceKey, TaskKey};
use rackwatch_status::Codec;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::cache::SharedCache;
use crate::store::{device_status_key, task_status_key, KeyValueStore};

/// Non-blocking producer side of the persistence queues.
#[derive(Clone)]
pub struct PersistQueues {
    tasks: mpsc::Sender<TaskKey>,
    devices: mpsc::Sender<DeviceKey>,
    dropped: Arc<AtomicU64>,
}

impl PersistQueues {
    pub fn notify_task(&self, key: TaskKey) {
        self.offer(&self.tasks, key);
    }

    pub fn notify_device(&self, key: DeviceKey) {
        self.offer(&self.devices, key);
    }

    /// Notifications discarded because a queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    fn offer<K>(&self, tx: &mpsc::Sender<K>, key: K) {
        match tx.try_send(key) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Persistence queue closed, dropping notification");
            }
        }
    }
}

/// Consumer side, one per entity kind.
pub struct Persister<K> {
    rx: mpsc::Receiver<K>,
    cache: SharedCache,
    store: Arc<dyn KeyValueStore>,
    codec: Codec,
}

/// Creates the queues and their consumers.
pub fn channel(
    capacity: usize,
    cache: SharedCache,
    store: Arc<dyn KeyValueStore>,
    codec: Codec,
) -> (PersistQueues, Persister<TaskKey>, Persister<DeviceKey>) {
    let (task_tx, task_rx) = mpsc::channel(capacity);
    let (device_tx, device_rx) = mpsc::channel(capacity);
    let queues = PersistQueues {
        tasks: task_tx,
        devices: device_tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    let tasks = Persister {
        rx: task_rx,
        cache: cache.clone(),
        store: store.clone(),
        codec,
    };
    let devices = Persister {
        rx: device_rx,
        cache,
        store,
        codec,
    };
    (queues, tasks, devices)
}

impl Persister<TaskKey> {
    /// Flushes task statuses until every queue handle is dropped.
    pub async fn run(mut self) {
        info!("Starting task status persister");
        while let Some(key) = self.rx.recv().await {
            let status = self.cache.read().await.task(key).cloned();
            let Some(status) = status else {
                debug!(task = %key, "Task no longer tracked, skipping persist");
                continue;
            };
            self.save(&task_status_key(key), &status).await;
        }
        info!("Task status persister shutting down");
    }
}

impl Persister<DeviceKey> {
    /// Flushes device statuses until every queue handle is dropped.
    pub async fn run(mut self) {
        info!("Starting device status persister");
        while let Some(key) = self.rx.recv().await {
            let status = self.cache.read().await.devices.get(&key).cloned();
            let Some(status) = status else {
                debug!(device = %key, "Device no longer tracked, skipping persist");
                continue;
            };
            self.save(&device_status_key(&key), &status).await;
        }
        info!("Device status persister shutting down");
    }
}

impl<K> Persister<K> {
    async fn save<T: serde::Serialize>(&self, key: &str, status: &T) {
        let bytes = match self.codec.encode(status) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode status for persistence");
                return;
            }
        };
        match self.store.set(key, bytes).await {
            Ok(()) => debug!(key, "Persisted status"),
            Err(e) => warn!(key, error = %e, "Failed to persist status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StatusCache;
    use crate::store::MemoryStore;
    use rackwatch_id::RackKey;
    use rackwatch_status::{DeviceDetails, DeviceStatus, TaskStatus, Variant};
    use tokio::time::Instant;

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let cache = StatusCache::new().into_shared();
        let (queues, _tasks, _devices) = channel(2, cache, Arc::new(MemoryStore::new()), Codec::Json);
        for local in 0..5 {
            queues.notify_task(TaskKey::new(RackKey::from_raw(1), local));
        }
        assert_eq!(queues.dropped(), 3);
    }

    #[tokio::test]
    async fn test_persists_current_value_not_enqueued_one() {
        let rack = RackKey::from_raw(65537);
        let task = TaskKey::new(rack, 1);
        let cache = StatusCache::new().into_shared();
        cache
            .write()
            .await
            .ensure_rack(rack, Instant::now())
            .0
            .tasks
            .insert(task, TaskStatus::unknown(task));

        let store = Arc::new(MemoryStore::new());
        let (queues, tasks, _devices) = channel(4, cache.clone(), store.clone(), Codec::Json);
        queues.notify_task(task);

        // Update after the notification was queued.
        if let Some(entry) = cache.write().await.racks.get_mut(&rack) {
            entry.tasks.get_mut(&task).unwrap().variant = Variant::Success;
        }

        drop(queues);
        tasks.run().await;

        let bytes = store.get(&task_status_key(task)).await.unwrap();
        let persisted: TaskStatus = Codec::Json.decode(&bytes).unwrap();
        assert_eq!(persisted.variant, Variant::Success);
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let cache = StatusCache::new().into_shared();
        let device: DeviceKey = "dev1".into();
        cache.write().await.devices.insert(
            device.clone(),
            DeviceStatus::new(
                "dev1",
                Variant::Info,
                "ok",
                DeviceDetails {
                    rack: RackKey::from_raw(1),
                    device: device.clone(),
                },
            ),
        );
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let (queues, _tasks, devices) = channel(4, cache, store.clone(), Codec::Json);
        queues.notify_device(device.clone());
        queues.notify_device("unknown".into());
        drop(queues);

        devices.run().await;
        assert_eq!(store.write_count(), 0);
    }
}
