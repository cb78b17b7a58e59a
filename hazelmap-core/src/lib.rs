//! Core types and wire protocol for the hazelmap distributed map.

#![warn(missing_docs)]

pub mod data;
pub mod error;
pub mod event;
pub mod protocol;

pub use data::Data;
pub use error::{HazelmapError, Result};
pub use event::EntryEventType;
pub use protocol::{compute_partition_hash, ClientMessage, ClientMessageCodec, Frame};
