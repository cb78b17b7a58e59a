//! Binary client protocol for map requests, responses and event pushes.
//!
//! A message is a sequence of length-prefixed frames. The first frame holds
//! the header and any fixed-size fields; variable-size fields follow as
//! separate frames, and the last frame carries the END flag.

mod client_message;
mod codec;
pub mod constants;
mod entry_event_codec;
mod frame;
mod map_codec;

pub use client_message::{compute_partition_hash, next_correlation_id, ClientMessage, FixedFields};
pub use codec::ClientMessageCodec;
pub use constants::*;
pub use entry_event_codec::{EntryEventParameters, SINGLE_ENTRY_AFFECTED};
pub use frame::Frame;
pub use map_codec::{check_not_error, encode_error, ErrorCode, MapRequest, MapResponse};
