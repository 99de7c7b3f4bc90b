//! In-memory channel registry and status bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rackwatch_id::ChannelKey;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bus::{BusError, Frame, FrameWriter, StatusBus};
use crate::channels::{Channel, ChannelProvisioner, ChannelSpec, ProvisionBatch, ProvisionError};
use crate::feed::{Subscription, SubscriptionId};

type Payloads = Vec<Vec<u8>>;

#[derive(Default)]
struct BusState {
    channels: HashMap<ChannelKey, ChannelSpec>,
    next_key: u32,
    subscribers: HashMap<String, HashMap<SubscriptionId, mpsc::Sender<Payloads>>>,
    next_subscription: SubscriptionId,
    reject_writes: Option<String>,
    written: Vec<Frame>,
    open_writers: usize,
}

impl BusState {
    fn key_of(&self, name: &str) -> Option<ChannelKey> {
        self.channels
            .iter()
            .find(|(_, spec)| spec.name == name)
            .map(|(key, _)| *key)
    }

    fn senders(&self, name: &str) -> Vec<mpsc::Sender<Payloads>> {
        self.subscribers
            .get(name)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Applies a batch to `self`. Callers apply to a copy and swap on success.
    fn apply(&mut self, batch: ProvisionBatch) -> Result<Vec<Channel>, ProvisionError> {
        for name in &batch.deletes {
            if let Some(key) = self.key_of(name) {
                self.channels.remove(&key);
            }
        }

        for (from, to) in &batch.renames {
            let Some(key) = self.key_of(from) else {
                continue;
            };
            if self.key_of(to).is_some() {
                return Err(ProvisionError::NameConflict {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            if let Some(spec) = self.channels.get_mut(&key) {
                spec.name = to.clone();
            }
        }

        let mut provisioned = Vec::with_capacity(batch.specs.len());
        for spec in batch.specs {
            if spec.name.is_empty() {
                return Err(ProvisionError::Invalid {
                    name: spec.name,
                    reason: "name must not be empty".to_string(),
                });
            }
            let key = match self.key_of(&spec.name) {
                Some(key) => key,
                None => {
                    self.next_key += 1;
                    ChannelKey::from_raw(self.next_key)
                }
            };
            if self.channels.get(&key) != Some(&spec) {
                self.channels.insert(key, spec.clone());
            }
            provisioned.push(Channel { key, spec });
        }

        Ok(provisioned)
    }
}

/// Channel registry and pub-sub fabric held entirely in memory.
///
/// Frames written through a writer are fanned out to the subscribers of each
/// series' channel name and recorded for inspection.
#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers payloads to every subscriber of `channel`, as a remote
    /// publisher would.
    pub async fn publish(&self, channel: &str, payloads: Payloads) -> Result<(), BusError> {
        let senders = {
            let state = lock(&self.state);
            if state.key_of(channel).is_none() {
                return Err(BusError::UnknownChannel(channel.to_string()));
            }
            state.senders(channel)
        };
        fan_out(senders, payloads).await;
        Ok(())
    }

    pub fn channel_by_name(&self, name: &str) -> Option<Channel> {
        let state = lock(&self.state);
        state.key_of(name).and_then(|key| {
            state.channels.get(&key).map(|spec| Channel {
                key,
                spec: spec.clone(),
            })
        })
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.state)
            .channels
            .values()
            .map(|spec| spec.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Frames acknowledged so far, in write order.
    pub fn written_frames(&self) -> Vec<Frame> {
        lock(&self.state).written.clone()
    }

    /// Makes writers reject frames with the given reason, or accept them again.
    pub fn set_reject_writes(&self, reason: Option<String>) {
        lock(&self.state).reject_writes = reason;
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.values().map(HashMap::len).sum()
    }

    pub fn open_writer_count(&self) -> usize {
        lock(&self.state).open_writers
    }
}

fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn fan_out(senders: Vec<mpsc::Sender<Payloads>>, payloads: Payloads) {
    for tx in senders {
        if tx.send(payloads.clone()).await.is_err() {
            debug!("Dropping payloads for released subscriber");
        }
    }
}

#[async_trait]
impl ChannelProvisioner for MemoryBus {
    async fn provision(&self, batch: ProvisionBatch) -> Result<Vec<Channel>, ProvisionError> {
        let mut state = lock(&self.state);
        let mut staged = BusState {
            channels: state.channels.clone(),
            next_key: state.next_key,
            ..BusState::default()
        };
        let provisioned = staged.apply(batch)?;
        state.channels = staged.channels;
        state.next_key = staged.next_key;
        info!(count = provisioned.len(), "Provisioned channels");
        Ok(provisioned)
    }
}

#[async_trait]
impl StatusBus for MemoryBus {
    fn subscribe(&self, channel: &str, buffer: usize) -> Result<Subscription<Payloads>, BusError> {
        let mut state = lock(&self.state);
        if state.key_of(channel).is_none() {
            return Err(BusError::UnknownChannel(channel.to_string()));
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = state.next_subscription;
        state.next_subscription += 1;
        state
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .insert(id, tx);
        Ok(Subscription { id, rx })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = lock(&self.state);
        for subs in state.subscribers.values_mut() {
            subs.remove(&id);
        }
    }

    async fn open_writer(&self, channels: &[ChannelKey]) -> Result<Box<dyn FrameWriter>, BusError> {
        let mut state = lock(&self.state);
        if let Some(missing) = channels.iter().find(|k| !state.channels.contains_key(*k)) {
            return Err(BusError::UnknownChannel(missing.to_string()));
        }
        state.open_writers += 1;
        Ok(Box::new(MemoryWriter {
            state: Arc::clone(&self.state),
            channels: channels.to_vec(),
        }))
    }
}

struct MemoryWriter {
    state: Arc<Mutex<BusState>>,
    channels: Vec<ChannelKey>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write(&mut self, frame: Frame) -> Result<(), BusError> {
        let deliveries = {
            let mut state = lock(&self.state);
            if let Some(reason) = &state.reject_writes {
                return Err(BusError::Rejected(reason.clone()));
            }
            let mut deliveries = Vec::new();
            for (key, payloads) in frame.series() {
                if !self.channels.contains(key) {
                    return Err(BusError::UnknownChannel(key.to_string()));
                }
                if let Some(spec) = state.channels.get(key) {
                    deliveries.push((state.senders(&spec.name), payloads.clone()));
                }
            }
            state.written.push(frame);
            deliveries
        };
        for (senders, payloads) in deliveries {
            fan_out(senders, payloads).await;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), BusError> {
        let mut state = lock(&self.state);
        state.open_writers = state.open_writers.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{RACK_STATUS_CHANNEL, TASK_STATUS_CHANNEL};
    use rackwatch_id::NodeKey;

    fn spec(name: &str) -> ChannelSpec {
        ChannelSpec::internal_json(name, NodeKey::from_raw(1))
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let bus = MemoryBus::new();
        let first = bus
            .provision(ProvisionBatch::status_channels(NodeKey::from_raw(1)))
            .await
            .unwrap();
        let second = bus
            .provision(ProvisionBatch::status_channels(NodeKey::from_raw(1)))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(bus.channel_names().len(), 4);
    }

    #[tokio::test]
    async fn test_provision_renames_legacy_channels() {
        let bus = MemoryBus::new();
        let legacy = bus
            .provision(ProvisionBatch::new().ensure(spec("sy_rack_state")).ensure(spec("sy_rack_heartbeat")))
            .await
            .unwrap();

        let channels = bus
            .provision(ProvisionBatch::status_channels(NodeKey::from_raw(1)))
            .await
            .unwrap();
        let rack = channels
            .iter()
            .find(|c| c.spec.name == RACK_STATUS_CHANNEL)
            .unwrap();
        assert_eq!(rack.key, legacy[0].key);
        assert!(bus.channel_by_name("sy_rack_heartbeat").is_none());
        assert!(bus.channel_by_name("sy_rack_state").is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_changes_nothing() {
        let bus = MemoryBus::new();
        bus.provision(ProvisionBatch::new().ensure(spec("a")).ensure(spec("b")))
            .await
            .unwrap();

        let err = bus
            .provision(ProvisionBatch::new().delete("a").rename("b", "c").ensure(spec("")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Invalid { .. }));
        assert_eq!(bus.channel_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name_conflicts() {
        let bus = MemoryBus::new();
        bus.provision(ProvisionBatch::new().ensure(spec("a")).ensure(spec("b")))
            .await
            .unwrap();
        let err = bus
            .provision(ProvisionBatch::new().rename("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NameConflict { .. }));
    }

    #[tokio::test]
    async fn test_written_frames_reach_subscribers() {
        let bus = MemoryBus::new();
        let channels = bus
            .provision(ProvisionBatch::new().ensure(spec(TASK_STATUS_CHANNEL)))
            .await
            .unwrap();
        let key = channels[0].key;
        let mut sub = bus.subscribe(TASK_STATUS_CHANNEL, 4).unwrap();

        let mut writer = bus.open_writer(&[key]).await.unwrap();
        let mut frame = Frame::new();
        frame.push(key, vec![b"{}".to_vec()]);
        writer.write(frame.clone()).await.unwrap();

        assert_eq!(sub.rx.recv().await.unwrap(), vec![b"{}".to_vec()]);
        assert_eq!(bus.written_frames(), vec![frame.clone()]);

        bus.set_reject_writes(Some("backpressure".to_string()));
        assert_eq!(
            writer.write(frame).await.unwrap_err(),
            BusError::Rejected("backpressure".to_string())
        );

        writer.close().await.unwrap();
        assert_eq!(bus.open_writer_count(), 0);
    }

    #[test]
    fn test_subscribe_unknown_channel() {
        let bus = MemoryBus::new();
        assert!(matches!(
            bus.subscribe("nope", 1),
            Err(BusError::UnknownChannel(_))
        ));
    }
}
