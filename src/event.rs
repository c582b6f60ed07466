//! Change Events
//!
//! The normalized record produced for each keyspace notification, plus the
//! encodings used to carry it:
//!
//! - [`ChangeEvent`] / [`EventType`]: The event itself
//! - [`EventData`]: Typed view over an event's `data` bytes
//! - [`WireEvent`]: JSON envelope for handing events to downstream sinks

mod codec;
mod types;
mod wire;

pub use codec::{EventData, encode_hash, encode_members};
pub use types::{ChangeEvent, EventType};
pub use wire::{DecodeError, WireEvent, decode_event, encode_event};
