//! Client endpoints as seen by the event dispatcher.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use hazelmap_core::{ClientMessage, HazelmapError, Result};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier of a client connection.
///
/// Registrations and lock owners hold this id only; the connection itself is
/// owned by the transport and looked up through an [`EndpointRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Creates a new random endpoint id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an endpoint id from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

/// Lookup of live client connections.
///
/// `send_event` must not block: the dispatcher calls it while a store
/// partition is locked.
pub trait EndpointRegistry: Send + Sync {
    /// Returns `true` if the endpoint is connected.
    fn is_alive(&self, endpoint: EndpointId) -> bool;

    /// Queues an event message for delivery to the endpoint.
    fn send_event(&self, endpoint: EndpointId, message: ClientMessage) -> Result<()>;
}

/// In-process endpoint registry backed by unbounded channels.
///
/// Each connected endpoint gets a receiver that yields the pushed messages.
#[derive(Debug, Default)]
pub struct LocalEndpoints {
    senders: RwLock<HashMap<EndpointId, mpsc::UnboundedSender<ClientMessage>>>,
}

impl LocalEndpoints {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a new endpoint and returns its id and event stream.
    pub fn connect(&self) -> (EndpointId, mpsc::UnboundedReceiver<ClientMessage>) {
        let id = EndpointId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        tracing::debug!(endpoint = %id, "endpoint connected");
        (id, rx)
    }

    /// Disconnects an endpoint. Returns `false` if it was not connected.
    pub fn disconnect(&self, endpoint: EndpointId) -> bool {
        let removed = self
            .senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&endpoint)
            .is_some();
        if removed {
            tracing::debug!(endpoint = %endpoint, "endpoint disconnected");
        }
        removed
    }

    /// Returns the number of connected endpoints.
    pub fn len(&self) -> usize {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no endpoint is connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EndpointRegistry for LocalEndpoints {
    fn is_alive(&self, endpoint: EndpointId) -> bool {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&endpoint)
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send_event(&self, endpoint: EndpointId, message: ClientMessage) -> Result<()> {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let tx = senders
            .get(&endpoint)
            .ok_or_else(|| HazelmapError::Endpoint(format!("{endpoint} is not connected")))?;
        tx.send(message)
            .map_err(|_| HazelmapError::Endpoint(format!("{endpoint} stopped receiving events")))
    }
}
