//! Entry event kinds shared by the dispatcher and the wire codec.

use std::fmt;

/// The kind of change an entry event describes.
///
/// Discriminants are the wire codes carried in the event push message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EntryEventType {
    /// A key was written that had no live value before.
    Added = 1,
    /// A key was explicitly removed.
    Removed = 2,
    /// An existing value was overwritten.
    Updated = 3,
    /// A key was evicted without a standard removal.
    Evicted = 4,
    /// Every entry of the map was evicted.
    EvictAll = 5,
    /// Every entry of the map was cleared.
    ClearAll = 6,
    /// A key's time-to-live elapsed.
    Expired = 8,
}

impl EntryEventType {
    /// All event types, in wire-code order.
    pub const ALL: [EntryEventType; 7] = [
        EntryEventType::Added,
        EntryEventType::Removed,
        EntryEventType::Updated,
        EntryEventType::Evicted,
        EntryEventType::EvictAll,
        EntryEventType::ClearAll,
        EntryEventType::Expired,
    ];

    /// Returns the wire code for this event type.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parses a wire code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Returns `true` for events that describe the whole map rather than one key.
    pub fn is_map_wide(self) -> bool {
        matches!(self, EntryEventType::ClearAll | EntryEventType::EvictAll)
    }
}

impl fmt::Display for EntryEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryEventType::Added => "ADDED",
            EntryEventType::Removed => "REMOVED",
            EntryEventType::Updated => "UPDATED",
            EntryEventType::Evicted => "EVICTED",
            EntryEventType::EvictAll => "EVICT_ALL",
            EntryEventType::ClearAll => "CLEAR_ALL",
            EntryEventType::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}
