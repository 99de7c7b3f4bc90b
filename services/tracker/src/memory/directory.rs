//! In-memory structural directory with a change feed.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use async_trait::async_trait;
use rackwatch_id::{DeviceKey, NodeKey, RackKey, TaskKey};
use rackwatch_status::{Device, Rack, Task};
use tokio::sync::mpsc;
use tracing::debug;

use crate::directory::{DeviceDirectory, DirectoryError, RackDirectory, TaskDirectory};
use crate::feed::{Change, ChangeFeed, Subscription, SubscriptionId};

/// A record addressable by key.
pub trait Keyed: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}

impl Keyed for Rack {
    type Key = RackKey;

    fn key(&self) -> RackKey {
        self.key
    }
}

impl Keyed for Task {
    type Key = TaskKey;

    fn key(&self) -> TaskKey {
        self.key
    }
}

impl Keyed for Device {
    type Key = DeviceKey;

    fn key(&self) -> DeviceKey {
        self.key.clone()
    }
}

type Batch<V> = Vec<Change<<V as Keyed>::Key, V>>;

struct State<V: Keyed> {
    records: HashMap<V::Key, V>,
    subscribers: HashMap<SubscriptionId, mpsc::Sender<Batch<V>>>,
    next_id: SubscriptionId,
    unavailable: bool,
}

/// Thread-safe record map that broadcasts every mutation.
pub struct MemoryDirectory<V: Keyed> {
    state: Mutex<State<V>>,
    /// Serializes mutations so subscribers see batches in commit order.
    commit: tokio::sync::Mutex<()>,
}

impl<V: Keyed> Default for MemoryDirectory<V> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                records: HashMap::new(),
                subscribers: HashMap::new(),
                next_id: 0,
                unavailable: false,
            }),
            commit: tokio::sync::Mutex::new(()),
        }
    }
}

impl<V: Keyed> MemoryDirectory<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory pre-populated with `records`, without notifying.
    pub fn with_records(records: impl IntoIterator<Item = V>) -> Self {
        let directory = Self::new();
        {
            let mut state = directory.lock();
            for record in records {
                state.records.insert(record.key(), record);
            }
        }
        directory
    }

    /// Creates or replaces a record.
    pub async fn set(&self, record: V) {
        self.set_many(vec![record]).await;
    }

    /// Creates or replaces several records as one change batch.
    pub async fn set_many(&self, records: Vec<V>) {
        let _commit = self.commit.lock().await;
        let (batch, subscribers) = {
            let mut state = self.lock();
            let batch: Batch<V> = records
                .into_iter()
                .map(|record| {
                    state.records.insert(record.key(), record.clone());
                    Change::set(record.key(), record)
                })
                .collect();
            (batch, state.subscribers.values().cloned().collect())
        };
        broadcast(subscribers, batch).await;
    }

    /// Deletes a record, returning whether it existed. Subscribers are
    /// notified either way.
    pub async fn delete(&self, key: &V::Key) -> bool {
        let _commit = self.commit.lock().await;
        let (existed, subscribers) = {
            let mut state = self.lock();
            let existed = state.records.remove(key).is_some();
            (existed, state.subscribers.values().cloned().collect())
        };
        broadcast(subscribers, vec![Change::delete(key.clone())]).await;
        existed
    }

    pub fn get(&self, key: &V::Key) -> Option<V> {
        self.lock().records.get(key).cloned()
    }

    pub fn list(&self) -> Vec<V> {
        self.lock().records.values().cloned().collect()
    }

    /// Makes list calls fail with [`DirectoryError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<V>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn list_where(&self, filter: impl Fn(&V) -> bool) -> Result<Vec<V>, DirectoryError> {
        let state = self.lock();
        if state.unavailable {
            return Err(DirectoryError::Unavailable("directory offline".to_string()));
        }
        Ok(state.records.values().filter(|r| filter(r)).cloned().collect())
    }
}

async fn broadcast<T: Clone>(subscribers: Vec<mpsc::Sender<T>>, batch: T) {
    for tx in subscribers {
        if tx.send(batch.clone()).await.is_err() {
            debug!("Dropping batch for released subscriber");
        }
    }
}

impl<V: Keyed> ChangeFeed<V::Key, V> for MemoryDirectory<V> {
    fn subscribe(&self, buffer: usize) -> Subscription<Batch<V>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, tx);
        Subscription { id, rx }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscribers.remove(&id);
    }
}

#[async_trait]
impl RackDirectory for MemoryDirectory<Rack> {
    async fn list_by_node(&self, node: NodeKey) -> Result<Vec<Rack>, DirectoryError> {
        self.list_where(|rack| rack.key.node() == node)
    }
}

#[async_trait]
impl TaskDirectory for MemoryDirectory<Task> {
    async fn list_by_rack(&self, rack: RackKey) -> Result<Vec<Task>, DirectoryError> {
        self.list_where(|task| task.rack() == rack)
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory<Device> {
    async fn list_all(&self) -> Result<Vec<Device>, DirectoryError> {
        self.list_where(|_| true)
    }
}
