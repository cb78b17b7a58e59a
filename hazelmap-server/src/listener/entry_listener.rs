//! In-process entry listener trait.

use std::sync::Arc;

use crate::listener::{EntryEvent, EntryEventType};

/// A listener for entry-level events on a map.
///
/// Every method has an empty default, so implementors only override the
/// events they care about.
///
/// # Example
///
/// ```ignore
/// struct AuditListener;
///
/// impl EntryListener for AuditListener {
///     fn entry_removed(&self, event: EntryEvent) {
///         tracing::info!(key = ?event.key, "entry removed");
///     }
/// }
/// ```
pub trait EntryListener: Send + Sync {
    /// Called when a key without a live value is written.
    fn entry_added(&self, event: EntryEvent) {
        let _ = event;
    }

    /// Called when an entry is removed.
    fn entry_removed(&self, event: EntryEvent) {
        let _ = event;
    }

    /// Called when an existing value is overwritten.
    fn entry_updated(&self, event: EntryEvent) {
        let _ = event;
    }

    /// Called when an entry is evicted.
    fn entry_evicted(&self, event: EntryEvent) {
        let _ = event;
    }

    /// Called when an entry's time-to-live elapses.
    fn entry_expired(&self, event: EntryEvent) {
        let _ = event;
    }

    /// Called once when the map is cleared.
    fn map_cleared(&self, event: EntryEvent) {
        let _ = event;
    }

    /// Called once when every entry of the map is evicted.
    fn map_evicted(&self, event: EntryEvent) {
        let _ = event;
    }
}

/// A shared entry listener for type-erased storage.
pub type BoxedEntryListener = Arc<dyn EntryListener>;

type Handler = Box<dyn Fn(EntryEvent) + Send + Sync>;

/// An entry listener built from closures.
///
/// Use [`FnEntryListener::builder`] to create a new instance.
#[derive(Default)]
pub struct FnEntryListener {
    on_added: Option<Handler>,
    on_removed: Option<Handler>,
    on_updated: Option<Handler>,
    on_evicted: Option<Handler>,
    on_expired: Option<Handler>,
    on_map_cleared: Option<Handler>,
    on_map_evicted: Option<Handler>,
}

impl FnEntryListener {
    /// Creates a new builder.
    pub fn builder() -> FnEntryListenerBuilder {
        FnEntryListenerBuilder::new()
    }
}

fn call(handler: &Option<Handler>, event: EntryEvent) {
    if let Some(f) = handler {
        f(event);
    }
}

impl EntryListener for FnEntryListener {
    fn entry_added(&self, event: EntryEvent) {
        call(&self.on_added, event);
    }

    fn entry_removed(&self, event: EntryEvent) {
        call(&self.on_removed, event);
    }

    fn entry_updated(&self, event: EntryEvent) {
        call(&self.on_updated, event);
    }

    fn entry_evicted(&self, event: EntryEvent) {
        call(&self.on_evicted, event);
    }

    fn entry_expired(&self, event: EntryEvent) {
        call(&self.on_expired, event);
    }

    fn map_cleared(&self, event: EntryEvent) {
        call(&self.on_map_cleared, event);
    }

    fn map_evicted(&self, event: EntryEvent) {
        call(&self.on_map_evicted, event);
    }
}

impl std::fmt::Debug for FnEntryListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEntryListener")
            .field("on_added", &self.on_added.is_some())
            .field("on_removed", &self.on_removed.is_some())
            .field("on_updated", &self.on_updated.is_some())
            .field("on_evicted", &self.on_evicted.is_some())
            .field("on_expired", &self.on_expired.is_some())
            .field("on_map_cleared", &self.on_map_cleared.is_some())
            .field("on_map_evicted", &self.on_map_evicted.is_some())
            .finish()
    }
}

/// Builder for [`FnEntryListener`].
#[derive(Default)]
pub struct FnEntryListenerBuilder {
    listener: FnEntryListener,
}

macro_rules! handler_setter {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub fn $name<F>(mut self, f: F) -> Self
        where
            F: Fn(EntryEvent) + Send + Sync + 'static,
        {
            self.listener.$name = Some(Box::new(f));
            self
        }
    };
}

impl FnEntryListenerBuilder {
    fn new() -> Self {
        Self::default()
    }

    handler_setter!(
        /// Sets the handler for added events.
        on_added
    );
    handler_setter!(
        /// Sets the handler for removed events.
        on_removed
    );
    handler_setter!(
        /// Sets the handler for updated events.
        on_updated
    );
    handler_setter!(
        /// Sets the handler for evicted events.
        on_evicted
    );
    handler_setter!(
        /// Sets the handler for expired events.
        on_expired
    );
    handler_setter!(
        /// Sets the handler for map cleared events.
        on_map_cleared
    );
    handler_setter!(
        /// Sets the handler for map evicted events.
        on_map_evicted
    );

    /// Builds the [`FnEntryListener`].
    pub fn build(self) -> FnEntryListener {
        self.listener
    }
}

impl std::fmt::Debug for FnEntryListenerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEntryListenerBuilder").finish()
    }
}

/// Dispatches an entry event to the matching method of a listener.
pub fn dispatch_entry_event(listener: &dyn EntryListener, event: EntryEvent) {
    match event.event_type {
        EntryEventType::Added => listener.entry_added(event),
        EntryEventType::Removed => listener.entry_removed(event),
        EntryEventType::Updated => listener.entry_updated(event),
        EntryEventType::Evicted => listener.entry_evicted(event),
        EntryEventType::Expired => listener.entry_expired(event),
        EntryEventType::ClearAll => listener.map_cleared(event),
        EntryEventType::EvictAll => listener.map_evicted(event),
    }
}
