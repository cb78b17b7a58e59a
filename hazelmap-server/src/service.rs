//! Per-member map service: owns the map containers and wires their parts.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use uuid::Uuid;

use crate::config::{MapConfig, ServiceConfig};
use crate::listener::{EndpointId, EndpointRegistry, EventDispatcher, ListenerRegistry};
use crate::lock::{LockOwner, LockTable};
use crate::operation::OperationExecutor;
use crate::proxy::MapProxy;
use crate::query::QueryEngine;
use crate::store::{EntryStore, ExpirySweeper};

/// Everything one map needs, constructed together.
///
/// The store, lock table, listener registry, dispatcher, executor and query
/// engine of a map reference each other explicitly and are never shared with
/// another map.
pub struct MapContainer {
    config: MapConfig,
    store: Arc<EntryStore>,
    locks: Arc<LockTable>,
    registry: Arc<ListenerRegistry>,
    dispatcher: Arc<EventDispatcher>,
    executor: Arc<OperationExecutor>,
    query: QueryEngine,
    sweeper: Mutex<Option<ExpirySweeper>>,
}

impl MapContainer {
    /// Wires a map from its configuration.
    ///
    /// Starts the expiry sweep if the configuration asks for one and a tokio
    /// runtime is available.
    pub fn new(
        config: MapConfig,
        member_id: Uuid,
        partition_count: u32,
        endpoints: Arc<dyn EndpointRegistry>,
    ) -> Self {
        let name = config.name().to_string();
        let registry = Arc::new(ListenerRegistry::new(name.clone()));
        let dispatcher = Arc::new(EventDispatcher::new(
            registry.clone(),
            endpoints,
            member_id,
            partition_count,
        ));
        let store = Arc::new(EntryStore::new(
            name,
            partition_count,
            config.default_ttl(),
            dispatcher.clone(),
        ));
        let locks = Arc::new(LockTable::new());
        let executor = Arc::new(OperationExecutor::new(
            store.clone(),
            locks.clone(),
            config.operation_timeout(),
        ));
        let query = QueryEngine::new(store.clone());
        let sweeper = config
            .expiry_scan_interval()
            .map(|interval| ExpirySweeper::spawn(store.clone(), interval));

        Self {
            config,
            store,
            locks,
            registry,
            dispatcher,
            executor,
            query,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Returns the map name.
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Returns the map configuration.
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Returns the entry store.
    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    /// Returns the lock table.
    pub fn locks(&self) -> &Arc<LockTable> {
        &self.locks
    }

    /// Returns the listener registry.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Returns the event dispatcher.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Returns the operation executor.
    pub fn executor(&self) -> &Arc<OperationExecutor> {
        &self.executor
    }

    /// Returns the query engine.
    pub fn query_engine(&self) -> &QueryEngine {
        &self.query
    }

    /// Releases the locks and listener registrations of an endpoint.
    pub fn release_endpoint(&self, endpoint: EndpointId) -> DisconnectCleanup {
        DisconnectCleanup {
            locks_released: self.locks.release_all(endpoint),
            listeners_removed: self.registry.remove_endpoint(endpoint),
        }
    }

    /// Stops the expiry sweep.
    pub async fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }
    }
}

impl std::fmt::Debug for MapContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapContainer")
            .field("name", &self.name())
            .field("store", &self.store)
            .field("listeners", &self.registry.len())
            .finish()
    }
}

/// What was released when an endpoint went away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisconnectCleanup {
    /// Keys whose lock was released.
    pub locks_released: usize,
    /// Listener registrations removed.
    pub listeners_removed: usize,
}

impl std::ops::AddAssign for DisconnectCleanup {
    fn add_assign(&mut self, other: Self) {
        self.locks_released += other.locks_released;
        self.listeners_removed += other.listeners_removed;
    }
}

/// The maps hosted by this member.
///
/// Maps are created on first use from [`ServiceConfig::map_config`].
pub struct MapService {
    config: ServiceConfig,
    endpoints: Arc<dyn EndpointRegistry>,
    maps: RwLock<HashMap<String, Arc<MapContainer>>>,
    owned_partitions: RwLock<Option<HashSet<u32>>>,
}

impl MapService {
    /// Creates a service that delivers events through `endpoints`.
    pub fn new(config: ServiceConfig, endpoints: Arc<dyn EndpointRegistry>) -> Self {
        Self {
            config,
            endpoints,
            maps: RwLock::new(HashMap::new()),
            owned_partitions: RwLock::new(None),
        }
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the container of a map, creating it if needed.
    pub fn container(&self, name: &str) -> Arc<MapContainer> {
        if let Some(container) = self.existing(name) {
            return container;
        }

        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        maps.entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(map = %name, "creating map container");
                let container = MapContainer::new(
                    self.config.map_config(name),
                    self.config.member_id(),
                    self.config.partition_count(),
                    self.endpoints.clone(),
                );
                let owned = self
                    .owned_partitions
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                container.store().set_owned_partitions(owned);
                Arc::new(container)
            })
            .clone()
    }

    /// Returns the container of a map if it exists.
    pub fn existing(&self, name: &str) -> Option<Arc<MapContainer>> {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns a proxy on a map acting as `caller`.
    pub fn proxy(&self, name: &str, caller: LockOwner) -> MapProxy {
        MapProxy::new(self.container(name), caller)
    }

    /// Returns the names of the maps created so far.
    pub fn map_names(&self) -> Vec<String> {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Sets the partitions this member owns, for every map. `None` means all.
    pub fn set_owned_partitions(&self, owned: Option<HashSet<u32>>) {
        *self
            .owned_partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = owned.clone();
        for container in self.containers() {
            container.store().set_owned_partitions(owned.clone());
        }
    }

    /// Releases everything an endpoint held across all maps.
    ///
    /// Called by the connection layer once it knows the endpoint is gone.
    pub fn on_endpoint_disconnected(&self, endpoint: EndpointId) -> DisconnectCleanup {
        let mut total = DisconnectCleanup::default();
        for container in self.containers() {
            total += container.release_endpoint(endpoint);
        }
        tracing::debug!(
            endpoint = %endpoint,
            locks = total.locks_released,
            listeners = total.listeners_removed,
            "cleaned up disconnected endpoint"
        );
        total
    }

    /// Drops a map and all its entries, locks and listeners.
    pub async fn destroy(&self, name: &str) -> bool {
        let removed = self
            .maps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match removed {
            Some(container) => {
                container.shutdown().await;
                tracing::debug!(map = %name, "destroyed map");
                true
            }
            None => false,
        }
    }

    /// Stops the background tasks of every map.
    pub async fn shutdown(&self) {
        let containers = self.containers();
        futures::future::join_all(containers.iter().map(|c| c.shutdown())).await;
    }

    fn containers(&self) -> Vec<Arc<MapContainer>> {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for MapService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapService")
            .field("member_id", &self.config.member_id())
            .field("maps", &self.map_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{LocalEndpoints, RegistrationSpec};
    use hazelmap_core::Data;
    use std::time::Duration;

    fn service() -> (Arc<LocalEndpoints>, MapService) {
        let endpoints = Arc::new(LocalEndpoints::new());
        let config = ServiceConfig::builder().partition_count(8).build().unwrap();
        (endpoints.clone(), MapService::new(config, endpoints))
    }

    #[test]
    fn test_containers_are_created_once() {
        let (_, service) = service();
        let a = service.container("orders");
        let b = service.container("orders");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(service.map_names(), vec!["orders".to_string()]);
        assert_eq!(a.store().partition_count(), 8);
        assert!(service.existing("users").is_none());
    }

    #[test]
    fn test_map_specific_config_is_used() {
        let endpoints = Arc::new(LocalEndpoints::new());
        let config = ServiceConfig::builder()
            .add_map(
                MapConfig::builder("sessions")
                    .default_ttl(Duration::from_secs(30))
                    .disable_expiry_sweep()
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let service = MapService::new(config, endpoints);
        assert_eq!(
            service.container("sessions").store().default_ttl(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(service.container("other").store().default_ttl(), None);
    }

    #[tokio::test]
    async fn test_disconnect_releases_locks_and_listeners() {
        let (endpoints, service) = service();
        let (gone, _rx) = endpoints.connect();
        let (stays, _rx2) = endpoints.connect();

        let container = service.container("m");
        container.locks().try_lock(&Data::from("k"), LockOwner::new(gone, 1));
        container.locks().try_lock(&Data::from("j"), LockOwner::new(stays, 1));
        container.registry().add(RegistrationSpec::endpoint(gone));
        container.registry().add(RegistrationSpec::endpoint(stays));

        let cleanup = service.on_endpoint_disconnected(gone);
        assert_eq!(
            cleanup,
            DisconnectCleanup {
                locks_released: 1,
                listeners_removed: 1,
            }
        );
        assert!(!container.locks().is_locked(&Data::from("k")));
        assert!(container.locks().is_locked(&Data::from("j")));
        assert_eq!(container.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_owned_partitions_apply_to_new_maps() {
        let (_, service) = service();
        service.set_owned_partitions(Some(HashSet::from([0])));
        let container = service.container("m");
        assert!(container.store().is_owned(0));
        assert!(!container.store().is_owned(1));
    }

    #[tokio::test]
    async fn test_destroy() {
        let (_, service) = service();
        service.container("m");
        assert!(service.destroy("m").await);
        assert!(!service.destroy("m").await);
        assert!(service.map_names().is_empty());
    }
}
