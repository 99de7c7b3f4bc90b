//! rackwatch tracker library
//!
//! The tracker follows every rack (a hardware-controller process), the tasks
//! configured on it and the devices attached to it, and answers "what did
//! this last report, and is it still alive?" without any I/O.
//!
//! ## Architecture
//!
//! ```text
//! structural directories ──► ChangeIngestor ─────┐
//!                                                ├──► StatusCache ◄── get_rack / get_task / get_device
//! status topics ─────────► LiveStatusIngestor ───┘        │
//!                                 │                       ├──► LivenessMonitor ──┐
//!                                 ▼                       │                      ▼
//!                           persistence queues ──► Persisters        StatusPublisher ──► status topics
//! ```
//!
//! Synthesized warnings from the change ingestor and the liveness monitor go
//! out through the single status publisher. All workers share one cache
//! behind a reader-writer lock.
//!
//! ## Modules
//!
//! - `bootstrap`: startup sequence behind [`Tracker::open`]
//! - `cache`: the shared status cache
//! - `ingest`: structural and live-status ingestion
//! - `memory`: in-memory directories and status bus
//! - `store`: status persistence (in-memory and SQLite)

mod bootstrap;
mod tracker;

pub mod bus;
pub mod cache;
pub mod channels;
pub mod config;
pub mod directory;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod memory;
pub mod monitor;
pub mod persist;
pub mod publisher;
pub mod store;

// Re-export commonly used types
pub use cache::RackEntry;
pub use channels::StatusChannels;
pub use config::{Config, TrackerSettings};
pub use error::TrackerError;
pub use tracker::Tracker;
