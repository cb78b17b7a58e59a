//! Synchronous fan-out of entry events to matching registrations.

use std::sync::Arc;

use hazelmap_core::protocol::{EntryEventParameters, PARTITION_ID_ANY};
use hazelmap_core::Result;
use uuid::Uuid;

use super::{
    dispatch_entry_event, EndpointId, EndpointRegistry, EntryEvent, ListenerRegistry,
    ListenerStats, ListenerTarget, Registration,
};

/// Delivers the events of one map to its registrations.
///
/// `publish` runs inside the mutation that produced the event, so it never
/// waits on a client: endpoint pushes go through the non-blocking
/// [`EndpointRegistry::send_event`] and any delivery failure is logged and
/// dropped. Local listeners run on the mutating task while the entry's
/// partition is locked and must not call back into the same map. A local
/// listener must not remove its own registration from inside a callback:
/// removal waits for in-flight deliveries to that registration.
pub struct EventDispatcher {
    registry: Arc<ListenerRegistry>,
    endpoints: Arc<dyn EndpointRegistry>,
    member_id: Uuid,
    partition_count: u32,
    stats: ListenerStats,
}

impl EventDispatcher {
    /// Creates a dispatcher for the registrations in `registry`.
    pub fn new(
        registry: Arc<ListenerRegistry>,
        endpoints: Arc<dyn EndpointRegistry>,
        member_id: Uuid,
        partition_count: u32,
    ) -> Self {
        Self {
            registry,
            endpoints,
            member_id,
            partition_count,
            stats: ListenerStats::new(),
        }
    }

    /// Returns the registry events are dispatched to.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Returns the id stamped on published events.
    pub fn member_id(&self) -> Uuid {
        self.member_id
    }

    /// Returns the dispatch statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Returns `true` if at least one listener is registered.
    pub fn has_listeners(&self) -> bool {
        !self.registry.is_empty()
    }

    /// Delivers an event to every matching registration.
    pub fn publish(&self, event: &EntryEvent) {
        self.stats.record_published();
        for registration in self.registry.snapshot() {
            if !registration.matches(event) {
                continue;
            }
            match registration.target() {
                ListenerTarget::Endpoint(endpoint) => {
                    self.deliver_to_endpoint(&registration, *endpoint, event);
                }
                ListenerTarget::Local(listener) => {
                    let delivered = registration.deliver_if_active(|| {
                        dispatch_entry_event(listener.as_ref(), self.shape(&registration, event));
                    });
                    if delivered.is_some() {
                        self.stats.record_delivered();
                    }
                }
            }
        }
    }

    fn shape(&self, registration: &Registration, event: &EntryEvent) -> EntryEvent {
        if registration.include_value() {
            event.clone()
        } else {
            event.without_values()
        }
    }

    fn deliver_to_endpoint(&self, registration: &Registration, endpoint: EndpointId, event: &EntryEvent) {
        if !self.endpoints.is_alive(endpoint) {
            self.stats.record_skipped_dead();
            tracing::trace!(
                map = %self.registry.map_name(),
                registration = %registration.id(),
                endpoint = %endpoint,
                "skipping event for dead endpoint"
            );
            return;
        }

        let outcome = registration.deliver_if_active(|| self.push(registration, endpoint, event));
        match outcome {
            None => {}
            Some(Ok(())) => self.stats.record_delivered(),
            Some(Err(e)) => {
                self.stats.record_error();
                tracing::warn!(
                    map = %self.registry.map_name(),
                    registration = %registration.id(),
                    endpoint = %endpoint,
                    event_type = %event.event_type,
                    error = %e,
                    "failed to deliver entry event"
                );
            }
        }
    }

    fn push(&self, registration: &Registration, endpoint: EndpointId, event: &EntryEvent) -> Result<()> {
        let shaped = self.shape(registration, event);
        let partition_id = shaped
            .key
            .as_ref()
            .map_or(PARTITION_ID_ANY, |key| key.partition_id(self.partition_count) as i32);
        let message = EntryEventParameters {
            registration_id: registration.id().as_uuid(),
            key: shaped.key,
            new_value: shaped.new_value,
            old_value: shaped.old_value,
            event_type: shaped.event_type,
            member_id: shaped.member_id,
            affected_count: shaped.affected_count,
        }
        .encode(partition_id)?;
        self.endpoints.send_event(endpoint, message)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("map", &self.registry.map_name())
            .field("member_id", &self.member_id)
            .field("registrations", &self.registry.len())
            .finish()
    }
}
