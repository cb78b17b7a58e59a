//! Per-map listener registrations.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use hazelmap_core::Data;

use super::{BoxedEntryListener, EndpointId, EntryEvent, ListenerId};
use crate::query::BoxedPredicate;

/// Where matching events are delivered.
#[derive(Clone)]
pub enum ListenerTarget {
    /// Encoded and pushed to a client connection.
    Endpoint(EndpointId),
    /// Invoked in-process.
    Local(BoxedEntryListener),
}

impl std::fmt::Debug for ListenerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerTarget::Endpoint(id) => f.debug_tuple("Endpoint").field(id).finish(),
            ListenerTarget::Local(_) => f.write_str("Local"),
        }
    }
}

/// What a caller asks for when adding a listener.
#[derive(Debug, Clone)]
pub struct RegistrationSpec {
    /// Delivery target.
    pub target: ListenerTarget,
    /// Only events for this key are delivered when set.
    pub key: Option<Data>,
    /// Only events whose entry matches are delivered when set.
    pub predicate: Option<BoxedPredicate>,
    /// Whether values are included in delivered events.
    pub include_value: bool,
}

impl RegistrationSpec {
    /// A registration delivering every event of the map to a client connection.
    pub fn endpoint(endpoint: EndpointId) -> Self {
        Self {
            target: ListenerTarget::Endpoint(endpoint),
            key: None,
            predicate: None,
            include_value: true,
        }
    }

    /// A registration delivering every event of the map to an in-process listener.
    pub fn local(listener: BoxedEntryListener) -> Self {
        Self {
            target: ListenerTarget::Local(listener),
            key: None,
            predicate: None,
            include_value: true,
        }
    }

    /// Restricts the registration to one key.
    pub fn with_key(mut self, key: Data) -> Self {
        self.key = Some(key);
        self
    }

    /// Restricts the registration to entries matching a predicate.
    pub fn with_predicate(mut self, predicate: BoxedPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Sets whether values are included in delivered events.
    pub fn include_value(mut self, include: bool) -> Self {
        self.include_value = include;
        self
    }
}

/// A live listener registration.
#[derive(Debug)]
pub struct Registration {
    id: ListenerId,
    spec: RegistrationSpec,
    // Held across an endpoint push so removal waits for an in-flight delivery.
    active: Mutex<bool>,
}

impl Registration {
    /// Returns the registration id.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns the delivery target.
    pub fn target(&self) -> &ListenerTarget {
        &self.spec.target
    }

    /// Returns the endpoint the registration belongs to, if any.
    pub fn endpoint(&self) -> Option<EndpointId> {
        match self.spec.target {
            ListenerTarget::Endpoint(id) => Some(id),
            ListenerTarget::Local(_) => None,
        }
    }

    /// Returns the key filter.
    pub fn key_filter(&self) -> Option<&Data> {
        self.spec.key.as_ref()
    }

    /// Returns whether values are included in delivered events.
    pub fn include_value(&self) -> bool {
        self.spec.include_value
    }

    /// Returns `true` until the registration is removed.
    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if the event passes the key and predicate filters.
    ///
    /// Map-wide events carry no entry and pass every filter.
    pub fn matches(&self, event: &EntryEvent) -> bool {
        let Some(key) = event.key.as_ref() else {
            return true;
        };
        if self.spec.key.as_ref().is_some_and(|filter| filter != key) {
            return false;
        }
        match (&self.spec.predicate, event.filter_value()) {
            (None, _) => true,
            (Some(predicate), Some(value)) => predicate.evaluate(key, value),
            (Some(_), None) => false,
        }
    }

    /// Runs `deliver` unless the registration has been removed.
    ///
    /// The registration cannot be removed while `deliver` runs.
    pub(crate) fn deliver_if_active<R>(&self, deliver: impl FnOnce() -> R) -> Option<R> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active {
            Some(deliver())
        } else {
            None
        }
    }

    fn deactivate(&self) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

/// The listener registrations of one map.
///
/// Adding the same listener twice yields two independent registrations.
#[derive(Debug)]
pub struct ListenerRegistry {
    map_name: String,
    registrations: RwLock<Vec<Arc<Registration>>>,
}

impl ListenerRegistry {
    /// Creates an empty registry for the named map.
    pub fn new(map_name: impl Into<String>) -> Self {
        Self {
            map_name: map_name.into(),
            registrations: RwLock::new(Vec::new()),
        }
    }

    /// Returns the map name.
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    /// Adds a registration and returns its id.
    pub fn add(&self, spec: RegistrationSpec) -> ListenerId {
        let id = ListenerId::new();
        tracing::debug!(
            map = %self.map_name,
            registration = %id,
            target = ?spec.target,
            key_filtered = spec.key.is_some(),
            "adding entry listener"
        );
        let registration = Arc::new(Registration {
            id,
            spec,
            active: Mutex::new(true),
        });
        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(registration);
        id
    }

    /// Removes a registration. Returns `false` if the id is unknown.
    ///
    /// Once this returns, no further event is delivered to the registration.
    pub fn remove(&self, id: ListenerId) -> bool {
        let removed = {
            let mut registrations = self
                .registrations
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let index = registrations.iter().position(|r| r.id == id);
            index.map(|index| registrations.remove(index))
        };
        match removed {
            Some(registration) => {
                registration.deactivate();
                tracing::debug!(map = %self.map_name, registration = %id, "removed entry listener");
                true
            }
            None => false,
        }
    }

    /// Removes every registration of an endpoint and returns how many there were.
    pub fn remove_endpoint(&self, endpoint: EndpointId) -> usize {
        let removed: Vec<Arc<Registration>> = {
            let mut registrations = self
                .registrations
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let (gone, kept): (Vec<_>, Vec<_>) = registrations
                .drain(..)
                .partition(|r| r.endpoint() == Some(endpoint));
            *registrations = kept;
            gone
        };
        for registration in &removed {
            registration.deactivate();
        }
        if !removed.is_empty() {
            tracing::debug!(
                map = %self.map_name,
                endpoint = %endpoint,
                count = removed.len(),
                "removed endpoint listeners"
            );
        }
        removed.len()
    }

    /// Returns the registration with the given id.
    pub fn get(&self, id: ListenerId) -> Option<Arc<Registration>> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Returns the current registrations, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Registration>> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of registrations.
    pub fn len(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if there are no registrations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
