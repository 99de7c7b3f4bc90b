//! In-memory collaborators.
//!
//! These back the development binary and the test suite. They honour the
//! same contracts as production collaborators: change batches are delivered
//! in commit order, provisioning is atomic, and writers acknowledge or reject
//! every frame.

mod bus;
mod directory;

pub use bus::MemoryBus;
pub use directory::{Keyed, MemoryDirectory};
