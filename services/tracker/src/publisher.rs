//! Status publisher.
//!
//! A single writer flow that every synthesized status batch funnels through.
//! Publication is best-effort telemetry: transport failures are logged and
//! never reach the producer of the batch.

use rackwatch_status::{Codec, DeviceStatus, RackStatus, TaskStatus};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, Frame, FrameWriter};
use crate::channels::StatusChannels;

/// Statuses synthesized together, written as one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusBatch {
    pub racks: Vec<RackStatus>,
    pub tasks: Vec<TaskStatus>,
    pub devices: Vec<DeviceStatus>,
}

impl StatusBatch {
    pub fn is_empty(&self) -> bool {
        self.racks.is_empty() && self.tasks.is_empty() && self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.racks.len() + self.tasks.len() + self.devices.len()
    }

    /// Encodes the batch into a frame over the status channels. Statuses that
    /// fail to encode are logged and left out.
    pub fn into_frame(self, codec: Codec, channels: &StatusChannels) -> Frame {
        let mut frame = Frame::new();
        frame.push(channels.rack_status, encode_all(codec, &self.racks));
        frame.push(channels.task_status, encode_all(codec, &self.tasks));
        frame.push(channels.device_status, encode_all(codec, &self.devices));
        frame
    }
}

fn encode_all<T: serde::Serialize>(codec: Codec, statuses: &[T]) -> Vec<Vec<u8>> {
    statuses
        .iter()
        .filter_map(|status| match codec.encode(status) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Failed to encode status");
                None
            }
        })
        .collect()
}

/// Handle for submitting batches to the publisher.
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<StatusBatch>,
}

impl PublisherHandle {
    pub(crate) fn from_sender(tx: mpsc::Sender<StatusBatch>) -> Self {
        Self { tx }
    }

    /// Queues a batch, waiting for room if the publisher is behind. Empty
    /// batches are discarded.
    pub async fn publish(&self, batch: StatusBatch) {
        if batch.is_empty() {
            return;
        }
        if self.tx.send(batch).await.is_err() {
            debug!("Status publisher stopped, dropping batch");
        }
    }
}

/// Owns the frame writer and drains the batch queue.
pub struct StatusPublisher {
    writer: Box<dyn FrameWriter>,
    rx: mpsc::Receiver<StatusBatch>,
    codec: Codec,
    channels: StatusChannels,
}

impl StatusPublisher {
    pub fn new(
        writer: Box<dyn FrameWriter>,
        codec: Codec,
        channels: StatusChannels,
        buffer: usize,
    ) -> (Self, PublisherHandle) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                writer,
                rx,
                codec,
                channels,
            },
            PublisherHandle { tx },
        )
    }

    /// Writes batches until every handle is dropped, then closes the writer.
    pub async fn run(mut self) -> Result<(), BusError> {
        info!("Starting status publisher");

        while let Some(batch) = self.rx.recv().await {
            let count = batch.len();
            let frame = batch.into_frame(self.codec, &self.channels);
            if frame.is_empty() {
                continue;
            }
            match self.writer.write(frame).await {
                Ok(()) => debug!(count, "Published statuses"),
                Err(e) => error!(error = %e, count, "Failed to publish statuses"),
            }
        }

        info!("Status publisher shutting down");
        self.writer.close().await
    }
}
