//! Tracker error type.

use thiserror::Error;

use crate::bus::BusError;
use crate::channels::ProvisionError;
use crate::directory::DirectoryError;
use crate::store::StoreError;

/// Errors surfaced by [`Tracker::open`](crate::Tracker::open) and
/// [`Tracker::close`](crate::Tracker::close). A running tracker never
/// reports errors to callers; degraded conditions are logged.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A structural directory failed.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// The status store failed with something other than a missing key.
    #[error("status store error: {0}")]
    Store(#[from] StoreError),

    /// Status channels could not be provisioned.
    #[error("channel provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    /// The status bus failed.
    #[error("status bus error: {0}")]
    Bus(#[from] BusError),

    /// A background worker panicked or was cancelled.
    #[error("worker '{worker}' failed: {reason}")]
    Worker { worker: &'static str, reason: String },

    /// One or more errors occurred while shutting down.
    #[error("shutdown failed: {}", join_messages(.0))]
    Close(Vec<TrackerError>),
}

fn join_messages(errors: &[TrackerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
