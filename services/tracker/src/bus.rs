//! Status bus contracts: topic subscriptions and frame writers.

use async_trait::async_trait;
use rackwatch_id::ChannelKey;
use thiserror::Error;

use crate::feed::{Subscription, SubscriptionId};

/// Errors from the status bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No channel with this name or key exists.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// The writer has been closed.
    #[error("writer closed")]
    Closed,

    /// The transport refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// A multi-channel write: an ordered list of series, each a channel key and
/// its encoded payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    series: Vec<(ChannelKey, Vec<Vec<u8>>)>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a series. Empty series are skipped.
    pub fn push(&mut self, channel: ChannelKey, payloads: Vec<Vec<u8>>) {
        if !payloads.is_empty() {
            self.series.push((channel, payloads));
        }
    }

    /// Payloads written to `channel`, if any.
    pub fn get(&self, channel: ChannelKey) -> Option<&[Vec<u8>]> {
        self.series
            .iter()
            .find(|(key, _)| *key == channel)
            .map(|(_, payloads)| payloads.as_slice())
    }

    /// Total number of payloads across all series.
    pub fn len(&self) -> usize {
        self.series.iter().map(|(_, p)| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn series(&self) -> &[(ChannelKey, Vec<Vec<u8>>)] {
        &self.series
    }
}

/// A durable writer over a fixed set of channels.
#[async_trait]
pub trait FrameWriter: Send {
    /// Writes a frame and waits for the transport acknowledgement.
    async fn write(&mut self, frame: Frame) -> Result<(), BusError>;

    /// Flushes and releases the writer.
    async fn close(self: Box<Self>) -> Result<(), BusError>;
}

/// Named status topics.
#[async_trait]
pub trait StatusBus: Send + Sync {
    /// Subscribes to batches of encoded payloads published on `channel`.
    fn subscribe(
        &self,
        channel: &str,
        buffer: usize,
    ) -> Result<Subscription<Vec<Vec<u8>>>, BusError>;

    /// Releases a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Opens a writer over the given channels.
    async fn open_writer(&self, channels: &[ChannelKey]) -> Result<Box<dyn FrameWriter>, BusError>;
}
