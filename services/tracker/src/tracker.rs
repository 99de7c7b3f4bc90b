//! The running tracker and its shutdown sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rackwatch_id::{DeviceKey, RackKey, TaskKey};
use rackwatch_status::{DeviceStatus, TaskStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bootstrap::{Prepared, Registrations};
use crate::bus::BusError;
use crate::cache::{RackEntry, SharedCache};
use crate::channels::StatusChannels;
use crate::config::TrackerSettings;
use crate::error::TrackerError;
use crate::ingest::{ChangeIngestor, LiveStatusIngestor};
use crate::monitor::LivenessMonitor;
use crate::persist;
use crate::publisher::StatusPublisher;

struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F>(name: &'static str, fut: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            handle: tokio::spawn(fut),
        }
    }

    async fn join(self, errors: &mut Vec<TrackerError>) {
        if let Err(e) = self.handle.await {
            errors.push(TrackerError::Worker {
                worker: self.name,
                reason: e.to_string(),
            });
        }
    }
}

/// Cluster-wide liveness and status tracker for racks, tasks and devices.
///
/// Open with [`Tracker::open`], query with the `get_*` accessors, and call
/// [`Tracker::close`] to stop every worker. Accessors only take the cache
/// read lock and never perform I/O.
pub struct Tracker {
    cache: SharedCache,
    channels: StatusChannels,
    shutdown: watch::Sender<bool>,
    registrations: Registrations,
    /// Ingestors and the monitor. They own every producer handle of the
    /// persistence queues and the publisher.
    producers: Vec<Worker>,
    persisters: Vec<Worker>,
    publisher: JoinHandle<Result<(), BusError>>,
    dropped: Arc<AtomicU64>,
}

impl Tracker {
    pub(crate) fn start(
        settings: TrackerSettings,
        prepared: Prepared,
        registrations: Registrations,
    ) -> Self {
        let Prepared {
            cache,
            channels,
            rack_changes,
            task_changes,
            device_changes,
            rack_status,
            task_status,
            device_status,
            writer,
            store,
        } = prepared;

        let cache = cache.into_shared();
        let codec = settings.codec;
        let threshold = settings.alive_threshold;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let (publisher, publish) =
            StatusPublisher::new(writer, codec, channels, settings.publish_buffer);
        let (queues, task_persister, device_persister) =
            persist::channel(settings.persist_queue_capacity, cache.clone(), store, codec);
        let dropped = queues.dropped_counter();

        let changes = ChangeIngestor::new(cache.clone(), publish.clone(), threshold);
        let live = LiveStatusIngestor::new(cache.clone(), queues, codec);
        let monitor = LivenessMonitor::new(cache.clone(), publish, threshold);

        let mut producers = vec![
            Worker::spawn(
                "rack_changes",
                changes.clone().run_racks(rack_changes.rx, shutdown_rx.clone()),
            ),
            Worker::spawn(
                "task_changes",
                changes.clone().run_tasks(task_changes.rx, shutdown_rx.clone()),
            ),
            Worker::spawn(
                "device_changes",
                changes.run_devices(device_changes.rx, shutdown_rx.clone()),
            ),
            Worker::spawn(
                "rack_status",
                live.clone().run_racks(rack_status.rx, shutdown_rx.clone()),
            ),
            Worker::spawn(
                "task_status",
                live.clone().run_tasks(task_status.rx, shutdown_rx.clone()),
            ),
            Worker::spawn(
                "device_status",
                live.run_devices(device_status.rx, shutdown_rx.clone()),
            ),
        ];
        let persisters = vec![
            Worker::spawn("task_persister", task_persister.run()),
            Worker::spawn("device_persister", device_persister.run()),
        ];
        let publisher = tokio::spawn(publisher.run());
        producers.push(Worker::spawn(
            "liveness_monitor",
            monitor.run(shutdown_rx),
        ));

        info!(workers = producers.len() + persisters.len() + 1, "Tracker started");

        Self {
            cache,
            channels,
            shutdown,
            registrations,
            producers,
            persisters,
            publisher,
            dropped,
        }
    }

    /// Latest state of a rack, including its task statuses.
    pub async fn get_rack(&self, key: RackKey) -> Option<RackEntry> {
        self.cache.read().await.racks.get(&key).cloned()
    }

    /// Latest status of a task.
    pub async fn get_task(&self, key: TaskKey) -> Option<TaskStatus> {
        self.cache.read().await.task(key).cloned()
    }

    /// Latest status of a device.
    pub async fn get_device(&self, key: &DeviceKey) -> Option<DeviceStatus> {
        self.cache.read().await.devices.get(key).cloned()
    }

    /// Keys of the provisioned status and command channels.
    pub fn channels(&self) -> &StatusChannels {
        &self.channels
    }

    /// Persistence notifications dropped because a queue was full.
    pub fn dropped_persist_notifications(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stops every worker and waits for it to exit.
    ///
    /// Producers stop first; the persistence queues and the publisher queue
    /// then close, and their consumers drain before exiting. The writer is
    /// closed last. Every failure along the way is reported together.
    pub async fn close(self) -> Result<(), TrackerError> {
        info!("Closing tracker");
        let mut errors = Vec::new();

        // Receivers are held by the producers, which are still running.
        let _ = self.shutdown.send(true);
        self.registrations.release_all();

        for worker in self.producers {
            worker.join(&mut errors).await;
        }
        for worker in self.persisters {
            worker.join(&mut errors).await;
        }
        match self.publisher.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(TrackerError::Bus(e)),
            Err(e) => errors.push(TrackerError::Worker {
                worker: "status_publisher",
                reason: e.to_string(),
            }),
        }

        if errors.is_empty() {
            info!("Tracker closed");
            Ok(())
        } else {
            warn!(errors = errors.len(), "Tracker closed with errors");
            Err(TrackerError::Close(errors))
        }
    }
}
