//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hazelmap_core::protocol::EntryEventParameters;
use hazelmap_core::ClientMessage;
use hazelmap_server::{
    EndpointId, LocalEndpoints, LockOwner, MapConfig, MapService, ServiceConfig,
};
use tokio::sync::mpsc::UnboundedReceiver;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub const TEST_PARTITION_COUNT: u32 = 16;

pub fn unique_name(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

pub fn default_config() -> ServiceConfig {
    ServiceConfig::builder()
        .partition_count(TEST_PARTITION_COUNT)
        .default_map(
            MapConfig::builder("default")
                .operation_timeout(Duration::from_secs(5))
                .disable_expiry_sweep()
                .build()
                .expect("failed to build map config"),
        )
        .build()
        .expect("failed to build service config")
}

pub fn service() -> (Arc<LocalEndpoints>, Arc<MapService>) {
    service_with(default_config())
}

pub fn service_with(config: ServiceConfig) -> (Arc<LocalEndpoints>, Arc<MapService>) {
    let endpoints = Arc::new(LocalEndpoints::new());
    let service = Arc::new(MapService::new(config, endpoints.clone()));
    (endpoints, service)
}

pub fn caller(endpoint: EndpointId, thread_id: i64) -> LockOwner {
    LockOwner::new(endpoint, thread_id)
}

/// Receives the next pushed event, failing if none arrives within a second.
pub async fn next_event(rx: &mut UnboundedReceiver<ClientMessage>) -> EntryEventParameters {
    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("endpoint channel closed");
    assert!(message.is_event());
    EntryEventParameters::decode(&message).expect("failed to decode event")
}

pub fn drain(rx: &mut UnboundedReceiver<ClientMessage>) -> Vec<EntryEventParameters> {
    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        events.push(EntryEventParameters::decode(&message).expect("failed to decode event"));
    }
    events
}
