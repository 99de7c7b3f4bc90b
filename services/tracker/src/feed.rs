//! Change feeds and subscriptions.
//!
//! A change feed broadcasts batches of set/delete changes to subscribers.
//! Each subscription owns the receiving half of a bounded channel; the feed
//! keeps the sending half until the subscription is released, at which point
//! the receiver drains and then reports the channel closed.

use tokio::sync::mpsc;

/// Identifier of a subscription, unique per feed.
pub type SubscriptionId = u64;

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeVariant {
    /// The record was created or updated.
    Set,
    /// The record was deleted.
    Delete,
}

/// A single change to a keyed record.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<K, V> {
    pub key: K,
    /// The new record for `Set`; `None` for `Delete`.
    pub value: Option<V>,
    pub variant: ChangeVariant,
}

impl<K, V> Change<K, V> {
    /// A create or update.
    pub fn set(key: K, value: V) -> Self {
        Self {
            key,
            value: Some(value),
            variant: ChangeVariant::Set,
        }
    }

    /// A deletion.
    pub fn delete(key: K) -> Self {
        Self {
            key,
            value: None,
            variant: ChangeVariant::Delete,
        }
    }
}

/// An active subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    pub id: SubscriptionId,
    pub rx: mpsc::Receiver<T>,
}

/// Source of change batches for records of type `V` keyed by `K`.
pub trait ChangeFeed<K, V>: Send + Sync {
    /// Registers a subscriber whose queue holds up to `buffer` batches.
    fn subscribe(&self, buffer: usize) -> Subscription<Vec<Change<K, V>>>;

    /// Releases a subscriber. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
