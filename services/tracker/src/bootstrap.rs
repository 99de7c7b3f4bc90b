//! Tracker startup.
//!
//! Opening a tracker loads the host's racks with their tasks, every device,
//! and the persisted statuses of both; provisions the status channels; and
//! subscribes to every feed and topic before any worker starts. Any failure
//! releases what was registered so far and aborts the open.

use std::sync::Arc;

use rackwatch_id::{DeviceKey, RackKey, TaskKey};
use rackwatch_status::{Codec, Device, DeviceStatus, Rack, Task, TaskStatus};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bus::{FrameWriter, StatusBus};
use crate::cache::{RackEntry, StatusCache};
use crate::channels::{
    ProvisionBatch, StatusChannels, DEVICE_STATUS_CHANNEL, RACK_STATUS_CHANNEL,
    TASK_STATUS_CHANNEL,
};
use crate::config::Config;
use crate::error::TrackerError;
use crate::feed::{Change, ChangeFeed, Subscription};
use crate::store::{device_status_key, task_status_key, KeyValueStore};
use crate::tracker::Tracker;

type Payloads = Vec<Vec<u8>>;

/// Unsubscribe actions for everything registered with a collaborator.
#[derive(Default)]
pub(crate) struct Registrations(Vec<Box<dyn FnOnce() + Send + Sync>>);

impl Registrations {
    fn push(&mut self, release: impl FnOnce() + Send + Sync + 'static) {
        self.0.push(Box::new(release));
    }

    /// Releases every registration, most recent first.
    pub(crate) fn release_all(self) {
        for release in self.0.into_iter().rev() {
            release();
        }
    }

    fn feed<K, V, F>(&mut self, feed: &Arc<F>, buffer: usize) -> Subscription<Vec<Change<K, V>>>
    where
        K: 'static,
        V: 'static,
        F: ChangeFeed<K, V> + ?Sized + 'static,
    {
        let sub = feed.subscribe(buffer);
        let feed = Arc::clone(feed);
        let id = sub.id;
        self.push(move || feed.unsubscribe(id));
        sub
    }

    fn topic(
        &mut self,
        bus: &Arc<dyn StatusBus>,
        channel: &str,
        buffer: usize,
    ) -> Result<Subscription<Payloads>, TrackerError> {
        let sub = bus.subscribe(channel, buffer)?;
        let bus = Arc::clone(bus);
        let id = sub.id;
        self.push(move || bus.unsubscribe(id));
        Ok(sub)
    }
}

/// Everything acquired during startup, ready to be handed to workers.
pub(crate) struct Prepared {
    pub cache: StatusCache,
    pub channels: StatusChannels,
    pub rack_changes: Subscription<Vec<Change<RackKey, Rack>>>,
    pub task_changes: Subscription<Vec<Change<TaskKey, Task>>>,
    pub device_changes: Subscription<Vec<Change<DeviceKey, Device>>>,
    pub rack_status: Subscription<Payloads>,
    pub task_status: Subscription<Payloads>,
    pub device_status: Subscription<Payloads>,
    pub writer: Box<dyn FrameWriter>,
    pub store: Arc<dyn KeyValueStore>,
}

impl Tracker {
    /// Opens a tracker. On error nothing is left running or subscribed.
    pub async fn open(config: Config) -> Result<Self, TrackerError> {
        config.settings.validate()?;
        info!(
            host = %config.settings.host,
            alive_threshold = %humantime::format_duration(config.settings.alive_threshold),
            codec = %config.settings.codec,
            "Opening tracker"
        );

        let mut registrations = Registrations::default();
        match prepare(&config, &mut registrations).await {
            Ok(prepared) => Ok(Tracker::start(config.settings, prepared, registrations)),
            Err(e) => {
                error!(error = %e, "Failed to open tracker");
                registrations.release_all();
                Err(e)
            }
        }
    }
}

async fn prepare(
    config: &Config,
    registrations: &mut Registrations,
) -> Result<Prepared, TrackerError> {
    let settings = &config.settings;
    let buffer = settings.feed_buffer;

    // Subscribe before loading so changes racing the load are queued, not lost.
    let rack_changes = registrations.feed(&config.racks, buffer);
    let task_changes = registrations.feed(&config.tasks, buffer);
    let device_changes = registrations.feed(&config.devices, buffer);

    let cache = load(config).await?;

    let provisioned = config
        .channels
        .provision(ProvisionBatch::status_channels(settings.host))
        .await?;
    let channels = StatusChannels::from_provisioned(&provisioned)?;
    debug!(?channels, "Status channels provisioned");

    let rack_status = registrations.topic(&config.bus, RACK_STATUS_CHANNEL, buffer)?;
    let task_status = registrations.topic(&config.bus, TASK_STATUS_CHANNEL, buffer)?;
    let device_status = registrations.topic(&config.bus, DEVICE_STATUS_CHANNEL, buffer)?;

    let writer = config.bus.open_writer(&channels.writable()).await?;

    Ok(Prepared {
        cache,
        channels,
        rack_changes,
        task_changes,
        device_changes,
        rack_status,
        task_status,
        device_status,
        writer,
        store: Arc::clone(&config.store),
    })
}

/// Builds the initial cache from the directories and the status store.
async fn load(config: &Config) -> Result<StatusCache, TrackerError> {
    let codec = config.settings.codec;
    let store = config.store.as_ref();
    let now = Instant::now();
    let mut cache = StatusCache::new();

    for rack in config.racks.list_by_node(config.settings.host).await? {
        let mut entry = RackEntry::unknown(rack.key, rack.name, now);
        for task in config.tasks.list_by_rack(rack.key).await? {
            if task.snapshot {
                continue;
            }
            let mut status = hydrate::<TaskStatus>(store, codec, &task_status_key(task.key))
                .await?
                .unwrap_or_else(|| TaskStatus::unknown(task.key));
            status.details.task = task.key;
            entry.tasks.insert(task.key, status);
        }
        cache.racks.insert(rack.key, entry);
    }

    for device in config.devices.list_all().await? {
        let mut status = hydrate::<DeviceStatus>(store, codec, &device_status_key(&device.key))
            .await?
            .unwrap_or_else(|| DeviceStatus::unknown(device.key.clone(), device.rack));
        // The directory decides which rack owns the device.
        status.details.rack = device.rack;
        status.details.device = device.key.clone();
        cache.devices.insert(device.key, status);
    }

    info!(
        racks = cache.racks.len(),
        tasks = cache.racks.values().map(|r| r.tasks.len()).sum::<usize>(),
        devices = cache.devices.len(),
        "Loaded tracked state"
    );
    Ok(cache)
}

/// Reads a persisted status. Missing and undecodable entries yield `None`;
/// other store failures are fatal.
async fn hydrate<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    codec: Codec,
    key: &str,
) -> Result<Option<T>, TrackerError> {
    match store.get(key).await {
        Ok(bytes) => match codec.decode(&bytes) {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable persisted status");
                Ok(None)
            }
        },
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
