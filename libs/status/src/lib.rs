//! # rackwatch-status
//!
//! Status model and payload codecs for rackwatch.
//!
//! ## Design Principles
//!
//! - A status is a severity (`Variant`) plus a human message, stamped with
//!   the time it was produced
//! - Each entity kind carries its own typed details, so a task status can
//!   never be confused with a device status
//! - Statuses travel as encoded payloads over status channels; the codec is
//!   chosen by configuration and defaults to JSON
//!
//! ## Payload Shapes
//!
//! - rack status: `{"variant":"info","message":"…","details":{"rack":65537}}`
//! - task status: `{"variant":"error","details":{"task":"281479271677953","running":false}}`
//! - device status: `{"variant":"warning","details":{"rack":65537,"device":"dev1"}}`
//!
//! ## Records
//!
//! The structural records (`Rack`, `Task`, `Device`) mirror what the
//! structural database stores. The tracker only relies on their keys, rack
//! names, rack attachment of devices, and the task snapshot flag.

mod codec;
mod error;
mod record;
mod status;

pub use codec::Codec;
pub use error::CodecError;
pub use record::{Device, Rack, Task};
pub use status::*;
