//! # rackwatch-id
//!
//! Typed keys for the entities tracked by rackwatch.
//!
//! ## Design Principles
//!
//! - Keys are compact integers allocated by the structural database
//! - Child keys embed their parent, so ownership is derivable without I/O
//! - Keys are typed to prevent mixing racks, tasks and nodes
//!
//! ## Key Layout
//!
//! ```text
//! NodeKey   u16
//! RackKey   u32  = node << 16 | local
//! TaskKey   u64  = rack << 32 | local
//! DeviceKey String (vendor assigned, e.g. a serial number)
//! ChannelKey u32 (allocated by the channel provisioner)
//! ```
//!
//! All integer keys display as plain decimal numbers.

mod error;
mod macros;
mod types;

pub use error::KeyError;
pub use types::*;
