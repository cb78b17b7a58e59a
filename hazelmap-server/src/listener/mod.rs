//! Entry listener registration and event dispatch.

mod dispatcher;
mod endpoint;
mod entry_listener;
mod registry;

pub use dispatcher::EventDispatcher;
pub use endpoint::{EndpointId, EndpointRegistry, LocalEndpoints};
pub use entry_listener::{
    dispatch_entry_event, BoxedEntryListener, EntryListener, FnEntryListener,
    FnEntryListenerBuilder,
};
pub use hazelmap_core::EntryEventType;
pub use registry::{ListenerRegistry, ListenerTarget, Registration, RegistrationSpec};

use std::sync::atomic::{AtomicU64, Ordering};

use hazelmap_core::protocol::SINGLE_ENTRY_AFFECTED;
use hazelmap_core::Data;
use uuid::Uuid;

/// Unique identifier for a listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Creates a new unique listener ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a listener ID from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A change to a map, as seen by listeners.
///
/// Single-key events carry the key and the values around the mutation;
/// map-wide events (`ClearAll`, `EvictAll`) carry no key and report the number
/// of removed entries in `affected_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryEvent {
    /// Map the event belongs to.
    pub map_name: String,
    /// Kind of change.
    pub event_type: EntryEventType,
    /// Affected key, absent for map-wide events.
    pub key: Option<Data>,
    /// Value before the change.
    pub old_value: Option<Data>,
    /// Value after the change.
    pub new_value: Option<Data>,
    /// Member the change happened on.
    pub member_id: Uuid,
    /// Number of entries covered by the event.
    pub affected_count: i32,
}

impl EntryEvent {
    /// Creates a single-key event.
    pub fn entry(
        map_name: impl Into<String>,
        event_type: EntryEventType,
        key: Data,
        old_value: Option<Data>,
        new_value: Option<Data>,
        member_id: Uuid,
    ) -> Self {
        Self {
            map_name: map_name.into(),
            event_type,
            key: Some(key),
            old_value,
            new_value,
            member_id,
            affected_count: SINGLE_ENTRY_AFFECTED,
        }
    }

    /// Creates a map-wide event.
    pub fn map_wide(
        map_name: impl Into<String>,
        event_type: EntryEventType,
        affected_count: i32,
        member_id: Uuid,
    ) -> Self {
        Self {
            map_name: map_name.into(),
            event_type,
            key: None,
            old_value: None,
            new_value: None,
            member_id,
            affected_count,
        }
    }

    /// Returns the value a predicate filter is evaluated against.
    ///
    /// That is the post-mutation value, or the last value for removals,
    /// evictions and expirations.
    pub fn filter_value(&self) -> Option<&Data> {
        match self.event_type {
            EntryEventType::Removed | EntryEventType::Evicted | EntryEventType::Expired => {
                self.old_value.as_ref()
            }
            _ => self.new_value.as_ref(),
        }
    }

    /// Returns a copy without values, for registrations that do not include them.
    pub fn without_values(&self) -> Self {
        Self {
            old_value: None,
            new_value: None,
            ..self.clone()
        }
    }
}

/// Statistics for event dispatch.
#[derive(Debug, Default)]
pub struct ListenerStats {
    events_published: AtomicU64,
    events_delivered: AtomicU64,
    skipped_dead: AtomicU64,
    errors: AtomicU64,
}

impl ListenerStats {
    /// Creates new listener statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the published events counter.
    pub fn record_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the delivered events counter.
    pub fn record_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the counter of deliveries skipped for dead endpoints.
    pub fn record_skipped_dead(&self) {
        self.skipped_dead.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the error counter.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of events published by mutations.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Returns the number of deliveries to listeners.
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    /// Returns the number of deliveries skipped because the endpoint was gone.
    pub fn skipped_dead(&self) -> u64 {
        self.skipped_dead.load(Ordering::Relaxed)
    }

    /// Returns the number of failed deliveries.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}
