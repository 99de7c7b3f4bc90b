//! Ingestors that keep the status cache in sync with the outside world.
//!
//! - [`ChangeIngestor`] follows the structural directories and keeps the
//!   *existence* of cache entries in sync with the database.
//! - [`LiveStatusIngestor`] follows the status topics and keeps the cached
//!   *values* in sync with what racks report.

mod changes;
mod live;

use std::future::Future;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

pub use changes::ChangeIngestor;
pub use live::LiveStatusIngestor;

/// Feeds batches from `rx` to `handle` until the feed closes or shutdown is
/// signalled.
pub(crate) async fn drive<T, F, Fut>(
    worker: &'static str,
    mut rx: mpsc::Receiver<T>,
    mut shutdown: watch::Receiver<bool>,
    mut handle: F,
) where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    info!(worker, "Starting ingestor");

    loop {
        tokio::select! {
            batch = rx.recv() => match batch {
                Some(batch) => handle(batch).await,
                None => {
                    debug!(worker, "Feed closed");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(worker, "Ingestor shutting down");
}
