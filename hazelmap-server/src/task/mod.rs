//! Request handling: decode, authorize, execute, encode.
//!
//! A [`MessageTask`] turns one client request into one response message.
//! Errors never escape as `Err`; they are encoded as error responses so the
//! connection layer can write every result back the same way.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hazelmap_core::protocol::{encode_error, MapRequest, MapResponse};
use hazelmap_core::{ClientMessage, Data, Result};

use crate::listener::{EndpointId, ListenerId, RegistrationSpec};
use crate::lock::LockOwner;
use crate::query::{IterationType, PredicateDecoder, QueryResult};
use crate::security::{ActionType, Authorizer};
use crate::service::MapService;
use crate::store::Ttl;

/// Handles a decoded client message.
#[async_trait]
pub trait MessageTask: Send + Sync {
    /// Produces the response to `message`, sent by `endpoint`.
    async fn handle(&self, endpoint: EndpointId, message: &ClientMessage) -> ClientMessage;
}

/// Returns the permission a request needs on its map.
pub fn required_action(request: &MapRequest) -> ActionType {
    match request {
        MapRequest::Get { .. }
        | MapRequest::ContainsKey { .. }
        | MapRequest::ContainsValue { .. }
        | MapRequest::IsLocked { .. }
        | MapRequest::Size { .. }
        | MapRequest::KeySet { .. }
        | MapRequest::Values { .. }
        | MapRequest::EntrySet { .. } => ActionType::Read,
        MapRequest::Put { .. }
        | MapRequest::Set { .. }
        | MapRequest::PutIfAbsent { .. }
        | MapRequest::PutTransient { .. }
        | MapRequest::TryPut { .. }
        | MapRequest::Replace { .. }
        | MapRequest::ReplaceIfSame { .. }
        | MapRequest::Evict { .. }
        | MapRequest::EvictAll { .. } => ActionType::Put,
        MapRequest::Remove { .. }
        | MapRequest::RemoveIfSame { .. }
        | MapRequest::TryRemove { .. }
        | MapRequest::Clear { .. } => ActionType::Remove,
        MapRequest::Lock { .. }
        | MapRequest::TryLock { .. }
        | MapRequest::Unlock { .. }
        | MapRequest::ForceUnlock { .. } => ActionType::Lock,
        MapRequest::AddEntryListener { .. } | MapRequest::RemoveEntryListener { .. } => {
            ActionType::Listen
        }
    }
}

fn wire_timeout(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

fn count(n: usize) -> MapResponse {
    MapResponse::Int(i32::try_from(n).unwrap_or(i32::MAX))
}

/// Executes map requests against a [`MapService`].
pub struct MapMessageTask {
    service: Arc<MapService>,
    authorizer: Arc<dyn Authorizer>,
    predicates: Arc<dyn PredicateDecoder>,
}

impl MapMessageTask {
    /// Creates a task handler.
    pub fn new(
        service: Arc<MapService>,
        authorizer: Arc<dyn Authorizer>,
        predicates: Arc<dyn PredicateDecoder>,
    ) -> Self {
        Self {
            service,
            authorizer,
            predicates,
        }
    }

    /// Returns the service requests run against.
    pub fn service(&self) -> &Arc<MapService> {
        &self.service
    }

    /// Authorizes and executes a decoded request.
    pub async fn process(&self, endpoint: EndpointId, request: MapRequest) -> Result<MapResponse> {
        self.authorizer
            .authorize(required_action(&request), request.map_name())?;

        let caller = |thread_id: i64| LockOwner::new(endpoint, thread_id);
        let map = |name: &str, thread_id: i64| self.service.proxy(name, caller(thread_id));

        let response = match request {
            MapRequest::Get { name, key, thread_id } => MapResponse::Nullable(map(&name, thread_id).get(&key)),
            MapRequest::Put { name, key, value, thread_id, ttl_ms } => MapResponse::Nullable(
                map(&name, thread_id)
                    .put_with_ttl(key, value, Ttl::from_millis(ttl_ms))
                    .await?,
            ),
            MapRequest::Set { name, key, value, thread_id, ttl_ms } => {
                map(&name, thread_id)
                    .set_with_ttl(key, value, Ttl::from_millis(ttl_ms))
                    .await?;
                MapResponse::Empty
            }
            MapRequest::PutIfAbsent { name, key, value, thread_id, ttl_ms } => MapResponse::Nullable(
                map(&name, thread_id)
                    .put_if_absent_with_ttl(key, value, Ttl::from_millis(ttl_ms))
                    .await?,
            ),
            MapRequest::PutTransient { name, key, value, thread_id, ttl_ms } => {
                map(&name, thread_id)
                    .put_transient(key, value, Ttl::from_millis(ttl_ms))
                    .await?;
                MapResponse::Empty
            }
            MapRequest::TryPut { name, key, value, thread_id, timeout_ms } => MapResponse::Bool(
                map(&name, thread_id)
                    .try_put(key, value, wire_timeout(timeout_ms))
                    .await?,
            ),
            MapRequest::Remove { name, key, thread_id } => {
                MapResponse::Nullable(map(&name, thread_id).remove(key).await?)
            }
            MapRequest::RemoveIfSame { name, key, value, thread_id } => {
                MapResponse::Bool(map(&name, thread_id).remove_if_same(key, value).await?)
            }
            MapRequest::TryRemove { name, key, thread_id, timeout_ms } => MapResponse::Nullable(
                map(&name, thread_id)
                    .try_remove(key, wire_timeout(timeout_ms))
                    .await?,
            ),
            MapRequest::Replace { name, key, value, thread_id } => {
                MapResponse::Nullable(map(&name, thread_id).replace(key, value).await?)
            }
            MapRequest::ReplaceIfSame { name, key, expected, value, thread_id } => MapResponse::Bool(
                map(&name, thread_id)
                    .replace_if_same(key, expected, value)
                    .await?,
            ),
            MapRequest::ContainsKey { name, key, thread_id } => {
                MapResponse::Bool(map(&name, thread_id).contains_key(&key))
            }
            MapRequest::ContainsValue { name, value } => MapResponse::Bool(map(&name, 0).contains_value(&value)),
            MapRequest::Lock { name, key, thread_id } => {
                map(&name, thread_id).lock(&key).await?;
                MapResponse::Empty
            }
            MapRequest::TryLock { name, key, thread_id, timeout_ms } => MapResponse::Bool(
                map(&name, thread_id)
                    .try_lock_timeout(&key, wire_timeout(timeout_ms))
                    .await?,
            ),
            MapRequest::Unlock { name, key, thread_id } => {
                map(&name, thread_id).unlock(&key)?;
                MapResponse::Empty
            }
            MapRequest::ForceUnlock { name, key } => {
                map(&name, 0).force_unlock(&key);
                MapResponse::Empty
            }
            MapRequest::IsLocked { name, key } => MapResponse::Bool(map(&name, 0).is_locked(&key)),
            MapRequest::Evict { name, key, thread_id } => MapResponse::Bool(map(&name, thread_id).evict(&key)),
            MapRequest::EvictAll { name } => {
                map(&name, 0).evict_all();
                MapResponse::Empty
            }
            MapRequest::Clear { name } => {
                map(&name, 0).clear();
                MapResponse::Empty
            }
            MapRequest::Size { name } => count(map(&name, 0).size()),
            MapRequest::KeySet { name, predicate } => {
                self.query(&name, predicate.as_ref(), IterationType::Key)?
            }
            MapRequest::Values { name, predicate } => {
                self.query(&name, predicate.as_ref(), IterationType::Value)?
            }
            MapRequest::EntrySet { name, predicate } => {
                self.query(&name, predicate.as_ref(), IterationType::Entry)?
            }
            MapRequest::AddEntryListener { name, key, predicate, include_value } => {
                let mut spec = RegistrationSpec::endpoint(endpoint).include_value(include_value);
                if let Some(key) = key {
                    spec = spec.with_key(key);
                }
                if let Some(predicate) = predicate {
                    spec = spec.with_predicate(self.predicates.decode(&predicate)?);
                }
                let id = map(&name, 0).add_listener(spec);
                MapResponse::Uuid(id.as_uuid())
            }
            MapRequest::RemoveEntryListener { name, registration_id } => MapResponse::Bool(
                map(&name, 0).remove_entry_listener(ListenerId::from_uuid(registration_id)),
            ),
        };
        Ok(response)
    }

    fn query(&self, name: &str, predicate: Option<&Data>, iteration: IterationType) -> Result<MapResponse> {
        let predicate = predicate.map(|p| self.predicates.decode(p)).transpose()?;
        let container = self.service.container(name);
        let result = container
            .query_engine()
            .query(predicate.as_deref(), iteration, false);
        Ok(match result {
            QueryResult::Keys(rows) | QueryResult::Values(rows) => MapResponse::DataList(rows),
            QueryResult::Entries(rows) => MapResponse::EntryList(rows),
        })
    }
}

#[async_trait]
impl MessageTask for MapMessageTask {
    async fn handle(&self, endpoint: EndpointId, message: &ClientMessage) -> ClientMessage {
        let correlation_id = message.correlation_id().unwrap_or(-1);
        let request = match MapRequest::decode(message) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(endpoint = %endpoint, error = %err, "rejecting malformed map request");
                return encode_error(&err, correlation_id);
            }
        };
        let request_type = request.message_type();
        match self.process(endpoint, request).await {
            Ok(response) => response.encode(request_type, correlation_id),
            Err(err) => {
                tracing::debug!(endpoint = %endpoint, error = %err, "map request failed");
                encode_error(&err, correlation_id)
            }
        }
    }
}

impl std::fmt::Debug for MapMessageTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapMessageTask")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_actions() {
        let key = Data::from("k");
        let get = MapRequest::Get {
            name: "m".into(),
            key: key.clone(),
            thread_id: 1,
        };
        let lock = MapRequest::TryLock {
            name: "m".into(),
            key: key.clone(),
            thread_id: 1,
            timeout_ms: 0,
        };
        let clear = MapRequest::Clear { name: "m".into() };
        let listen = MapRequest::AddEntryListener {
            name: "m".into(),
            key: None,
            predicate: None,
            include_value: true,
        };
        assert_eq!(required_action(&get), ActionType::Read);
        assert_eq!(required_action(&lock), ActionType::Lock);
        assert_eq!(required_action(&clear), ActionType::Remove);
        assert_eq!(required_action(&listen), ActionType::Listen);
    }

    #[test]
    fn test_wire_timeout_clamps_negative() {
        assert_eq!(wire_timeout(-5), Duration::ZERO);
        assert_eq!(wire_timeout(250), Duration::from_millis(250));
    }
}
