//! Caller-facing map handles.

mod map;

pub use map::MapProxy;
