//! Member-side core of a partitioned distributed map.
//!
//! A member hosts any number of named maps. Each map is a
//! [`MapContainer`] holding a partitioned entry store, a table of per-key
//! locks, a listener registry with its event dispatcher, an operation
//! executor and a query engine, all wired together explicitly. Callers reach
//! a map through a [`MapProxy`]; remote clients reach it through a
//! [`MapMessageTask`], which decodes the request, checks permissions and
//! encodes the response.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hazelmap_server::{LocalEndpoints, LockOwner, MapService, ServiceConfig};
//! use hazelmap_core::Data;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoints = Arc::new(LocalEndpoints::new());
//!     let service = MapService::new(ServiceConfig::default(), endpoints.clone());
//!
//!     let (client, _events) = endpoints.connect();
//!     let map = service.proxy("sessions", LockOwner::new(client, 1));
//!
//!     map.put(Data::from("user-1"), Data::from("token")).await?;
//!     assert_eq!(map.get(&Data::from("user-1")), Some(Data::from("token")));
//!
//!     map.lock(&Data::from("user-1")).await?;
//!     map.unlock(&Data::from("user-1"))?;
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! Operations on one key are linearizable: every partition is guarded by its
//! own mutex and events are published before that mutex is released. Only
//! lock acquisition and mutations of a key locked by another owner suspend
//! the caller. Event delivery to client endpoints never blocks and never
//! fails the mutation that triggered it.
//!
//! # Feature Flags
//!
//! | Flag | Purpose |
//! |------|---------|
//! | `config-file` | Load [`ServiceConfig`] from YAML or TOML files |

#![warn(missing_docs)]

pub mod config;
pub mod config_file;
pub mod listener;
pub mod lock;
pub mod operation;
pub mod proxy;
pub mod query;
pub mod security;
pub mod service;
pub mod store;
pub mod task;

pub use config::{ConfigError, MapConfig, MapConfigBuilder, ServiceConfig, ServiceConfigBuilder};
pub use config_file::{FileConfig, FileMapConfig};
#[cfg(feature = "config-file")]
pub use config_file::load_config;
pub use hazelmap_core as core;
pub use listener::{
    BoxedEntryListener, EndpointId, EndpointRegistry, EntryEvent, EntryEventType, EntryListener,
    EventDispatcher, FnEntryListener, FnEntryListenerBuilder, ListenerId, ListenerRegistry,
    ListenerStats, LocalEndpoints, RegistrationSpec,
};
pub use lock::{LockOwner, LockTable};
pub use operation::{
    EntryProcessor, EntryProcessorResult, LocalMapStats, MapEntry, MapFuture, MapInterceptor,
    OperationExecutor,
};
pub use proxy::MapProxy;
pub use query::{
    BoxedPredicate, IterationType, NoPredicateDecoder, Predicate, PredicateDecoder, Predicates,
    QueryEngine, QueryResult,
};
pub use security::{ActionType, AllowAll, Authorizer, Role, RoleAuthorizer};
pub use service::{DisconnectCleanup, MapContainer, MapService};
pub use store::{EntryStore, EntryView, ExpirySweeper, Ttl};
pub use task::{MapMessageTask, MessageTask};
