//! The map operation surface presented to one caller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use hazelmap_core::{Data, Result};

use crate::listener::{BoxedEntryListener, ListenerId, ListenerStats, RegistrationSpec};
use crate::lock::LockOwner;
use crate::operation::{EntryProcessor, EntryProcessorResult, LocalMapStats, MapFuture, MapInterceptor};
use crate::query::{IterationType, Predicate, QueryResult};
use crate::service::MapContainer;
use crate::store::{EntryView, Ttl};

/// A handle on a map that performs every operation as a fixed caller.
///
/// The caller identity decides lock ownership: locks taken through this
/// proxy are owned by its [`LockOwner`], and mutations through it pass keys
/// that owner has locked. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct MapProxy {
    container: Arc<MapContainer>,
    caller: LockOwner,
}

impl MapProxy {
    /// Creates a proxy acting as `caller`.
    pub fn new(container: Arc<MapContainer>, caller: LockOwner) -> Self {
        Self { container, caller }
    }

    /// Returns the same map acting as another caller.
    pub fn with_caller(&self, caller: LockOwner) -> Self {
        Self::new(self.container.clone(), caller)
    }

    /// Returns the map name.
    pub fn name(&self) -> &str {
        self.container.name()
    }

    /// Returns the caller this proxy acts as.
    pub fn caller(&self) -> LockOwner {
        self.caller
    }

    /// Returns the container behind this proxy.
    pub fn container(&self) -> &Arc<MapContainer> {
        &self.container
    }

    // ---- reads ----

    /// Returns the value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &Data) -> Option<Data> {
        self.container.executor().get(key)
    }

    /// Returns the values of the given keys that are present.
    pub fn get_all(&self, keys: &[Data]) -> HashMap<Data, Data> {
        self.container.executor().get_all(keys)
    }

    /// Returns `true` if the key has a value.
    pub fn contains_key(&self, key: &Data) -> bool {
        self.container.executor().contains_key(key)
    }

    /// Returns `true` if any entry has `value`.
    pub fn contains_value(&self, value: &Data) -> bool {
        self.container.executor().contains_value(value)
    }

    /// Returns the entry with its metadata.
    pub fn get_entry_view(&self, key: &Data) -> Option<EntryView> {
        self.container.executor().get_entry_view(key)
    }

    /// Returns the number of entries.
    pub fn size(&self) -> usize {
        self.container.store().size()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.container.store().is_empty()
    }

    // ---- writes ----

    /// Stores a value with the map default TTL and returns the previous one.
    pub async fn put(&self, key: Data, value: Data) -> Result<Option<Data>> {
        self.put_with_ttl(key, value, Ttl::MapDefault).await
    }

    /// Stores a value with an explicit TTL and returns the previous one.
    pub async fn put_with_ttl(&self, key: Data, value: Data, ttl: Ttl) -> Result<Option<Data>> {
        self.container.executor().put(self.caller, key, value, ttl).await
    }

    /// Stores a value without returning the previous one.
    pub async fn set(&self, key: Data, value: Data) -> Result<()> {
        self.set_with_ttl(key, value, Ttl::MapDefault).await
    }

    /// Stores a value with an explicit TTL without returning the previous one.
    pub async fn set_with_ttl(&self, key: Data, value: Data, ttl: Ttl) -> Result<()> {
        self.container.executor().set(self.caller, key, value, ttl).await
    }

    /// Stores a value that is not backed up.
    pub async fn put_transient(&self, key: Data, value: Data, ttl: Ttl) -> Result<()> {
        self.container.executor().put_transient(self.caller, key, value, ttl).await
    }

    /// Stores a value only if the key is absent; returns the existing value otherwise.
    pub async fn put_if_absent(&self, key: Data, value: Data) -> Result<Option<Data>> {
        self.put_if_absent_with_ttl(key, value, Ttl::MapDefault).await
    }

    /// [`put_if_absent`](Self::put_if_absent) with an explicit TTL.
    pub async fn put_if_absent_with_ttl(&self, key: Data, value: Data, ttl: Ttl) -> Result<Option<Data>> {
        self.container
            .executor()
            .put_if_absent(self.caller, key, value, ttl)
            .await
    }

    /// Stores a value unless the key stays locked by someone else past `timeout`.
    pub async fn try_put(&self, key: Data, value: Data, timeout: Duration) -> Result<bool> {
        self.container.executor().try_put(self.caller, key, value, timeout).await
    }

    /// Stores every entry of `entries`.
    pub async fn put_all(&self, entries: HashMap<Data, Data>) -> Result<()> {
        self.container.executor().put_all(self.caller, entries).await
    }

    /// Replaces the value of an existing key and returns the old one.
    pub async fn replace(&self, key: Data, value: Data) -> Result<Option<Data>> {
        self.container.executor().replace(self.caller, key, value).await
    }

    /// Replaces the value only if it equals `expected` byte for byte.
    pub async fn replace_if_same(&self, key: Data, expected: Data, value: Data) -> Result<bool> {
        self.container
            .executor()
            .replace_if_same(self.caller, key, expected, value)
            .await
    }

    /// Removes a key and returns its value.
    pub async fn remove(&self, key: Data) -> Result<Option<Data>> {
        self.container.executor().remove(self.caller, key).await
    }

    /// Removes a key only if its value equals `expected`.
    pub async fn remove_if_same(&self, key: Data, expected: Data) -> Result<bool> {
        self.container.executor().remove_if_same(self.caller, key, expected).await
    }

    /// Removes a key without returning its value.
    pub async fn delete(&self, key: Data) -> Result<()> {
        self.container.executor().delete(self.caller, key).await
    }

    /// Removes a key, failing with `Timeout` if it stays locked past `timeout`.
    pub async fn try_remove(&self, key: Data, timeout: Duration) -> Result<Option<Data>> {
        self.container.executor().try_remove(self.caller, key, timeout).await
    }

    /// Evicts a key. Publishes `Evicted`; locked keys are not evicted.
    pub fn evict(&self, key: &Data) -> bool {
        self.container.executor().evict(key)
    }

    /// Evicts every unlocked entry.
    pub fn evict_all(&self) -> usize {
        self.container.executor().evict_all()
    }

    /// Removes every unlocked entry.
    pub fn clear(&self) -> usize {
        self.container.executor().clear()
    }

    // ---- non-blocking variants ----

    /// Starts a read.
    pub fn get_async(&self, key: Data) -> MapFuture<Option<Data>> {
        self.container.executor().get_async(key)
    }

    /// Starts a [`put`](Self::put).
    pub fn put_async(&self, key: Data, value: Data) -> MapFuture<Option<Data>> {
        self.container
            .executor()
            .put_async(self.caller, key, value, Ttl::MapDefault)
    }

    /// Starts a [`put_with_ttl`](Self::put_with_ttl).
    pub fn put_with_ttl_async(&self, key: Data, value: Data, ttl: Ttl) -> MapFuture<Option<Data>> {
        self.container.executor().put_async(self.caller, key, value, ttl)
    }

    /// Starts a [`set`](Self::set).
    pub fn set_async(&self, key: Data, value: Data) -> MapFuture<()> {
        self.container
            .executor()
            .set_async(self.caller, key, value, Ttl::MapDefault)
    }

    /// Starts a [`put_if_absent`](Self::put_if_absent).
    pub fn put_if_absent_async(&self, key: Data, value: Data) -> MapFuture<Option<Data>> {
        self.container
            .executor()
            .put_if_absent_async(self.caller, key, value, Ttl::MapDefault)
    }

    /// Starts a [`replace`](Self::replace).
    pub fn replace_async(&self, key: Data, value: Data) -> MapFuture<Option<Data>> {
        self.container.executor().replace_async(self.caller, key, value)
    }

    /// Starts a [`remove`](Self::remove).
    pub fn remove_async(&self, key: Data) -> MapFuture<Option<Data>> {
        self.container.executor().remove_async(self.caller, key)
    }

    /// Starts a [`delete`](Self::delete).
    pub fn delete_async(&self, key: Data) -> MapFuture<()> {
        self.container.executor().delete_async(self.caller, key)
    }

    // ---- locks ----

    /// Locks a key for this caller, waiting as long as needed. Reentrant.
    pub async fn lock(&self, key: &Data) -> Result<()> {
        self.container.locks().lock(key, self.caller).await
    }

    /// Locks a key only if it is free or already held by this caller.
    pub fn try_lock(&self, key: &Data) -> bool {
        self.container.locks().try_lock(key, self.caller)
    }

    /// Locks a key, waiting at most `timeout`.
    pub async fn try_lock_timeout(&self, key: &Data, timeout: Duration) -> Result<bool> {
        self.container.locks().try_lock_timeout(key, self.caller, timeout).await
    }

    /// Releases one hold of this caller's lock on `key`.
    pub fn unlock(&self, key: &Data) -> Result<()> {
        self.container.locks().unlock(key, self.caller)
    }

    /// Releases the lock on `key` whoever holds it.
    pub fn force_unlock(&self, key: &Data) -> bool {
        self.container.locks().force_unlock(key)
    }

    /// Returns `true` if anyone holds the lock on `key`.
    pub fn is_locked(&self, key: &Data) -> bool {
        self.container.locks().is_locked(key)
    }

    // ---- listeners ----

    /// Subscribes the caller's endpoint to entry events.
    ///
    /// Events are pushed to the endpoint while it is alive. Filters are
    /// optional; without them every entry event of the map is delivered.
    pub fn add_entry_listener(
        &self,
        key: Option<Data>,
        predicate: Option<Arc<dyn Predicate>>,
        include_value: bool,
    ) -> ListenerId {
        let mut spec = RegistrationSpec::endpoint(self.caller.endpoint).include_value(include_value);
        if let Some(key) = key {
            spec = spec.with_key(key);
        }
        if let Some(predicate) = predicate {
            spec = spec.with_predicate(predicate);
        }
        self.container.registry().add(spec)
    }

    /// Subscribes an in-process listener to every entry and map-wide event.
    pub fn add_local_entry_listener(&self, listener: BoxedEntryListener) -> ListenerId {
        self.container.registry().add(RegistrationSpec::local(listener))
    }

    /// Registers a fully specified listener.
    pub fn add_listener(&self, spec: RegistrationSpec) -> ListenerId {
        self.container.registry().add(spec)
    }

    /// Removes a listener. No event reaches it after this returns.
    pub fn remove_entry_listener(&self, id: ListenerId) -> bool {
        self.container.registry().remove(id)
    }

    /// Returns event delivery statistics.
    pub fn listener_stats(&self) -> &ListenerStats {
        self.container.dispatcher().stats()
    }

    // ---- queries ----

    /// Runs a query with an explicit iteration type.
    pub fn query(&self, predicate: Option<&dyn Predicate>, iteration: IterationType, local_only: bool) -> QueryResult {
        self.container.query_engine().query(predicate, iteration, local_only)
    }

    /// Returns the keys of matching entries.
    pub fn key_set(&self, predicate: Option<&dyn Predicate>) -> HashSet<Data> {
        match self.query(predicate, IterationType::Key, false) {
            QueryResult::Keys(keys) => keys.into_iter().collect(),
            _ => HashSet::new(),
        }
    }

    /// Returns the keys of matching entries in owned partitions.
    pub fn local_key_set(&self, predicate: Option<&dyn Predicate>) -> HashSet<Data> {
        match self.query(predicate, IterationType::Key, true) {
            QueryResult::Keys(keys) => keys.into_iter().collect(),
            _ => HashSet::new(),
        }
    }

    /// Returns the values of matching entries.
    pub fn values(&self, predicate: Option<&dyn Predicate>) -> Vec<Data> {
        match self.query(predicate, IterationType::Value, false) {
            QueryResult::Values(values) => values,
            _ => Vec::new(),
        }
    }

    /// Returns the matching entries.
    pub fn entry_set(&self, predicate: Option<&dyn Predicate>) -> Vec<(Data, Data)> {
        match self.query(predicate, IterationType::Entry, false) {
            QueryResult::Entries(entries) => entries,
            _ => Vec::new(),
        }
    }

    // ---- processing and interception ----

    /// Runs `processor` atomically on one entry.
    pub async fn execute_on_key(&self, key: Data, processor: &dyn EntryProcessor) -> Result<Option<Data>> {
        self.container
            .executor()
            .execute_on_key(self.caller, key, processor)
            .await
    }

    /// Runs `processor` on each of `keys`.
    pub async fn execute_on_keys(&self, keys: Vec<Data>, processor: &dyn EntryProcessor) -> Result<EntryProcessorResult> {
        self.container
            .executor()
            .execute_on_keys(self.caller, keys, processor)
            .await
    }

    /// Starts an [`execute_on_key`](Self::execute_on_key).
    pub fn execute_on_key_async(&self, key: Data, processor: Arc<dyn EntryProcessor>) -> MapFuture<Option<Data>> {
        self.container
            .executor()
            .execute_on_key_async(self.caller, key, processor)
    }

    /// Adds an interceptor and returns its id.
    pub fn add_interceptor(&self, interceptor: Arc<dyn MapInterceptor>) -> String {
        self.container.executor().interceptors().add(interceptor)
    }

    /// Removes an interceptor.
    pub fn remove_interceptor(&self, id: &str) -> bool {
        self.container.executor().interceptors().remove(id)
    }

    /// Returns the operation statistics of this map on this member.
    pub fn local_map_stats(&self) -> LocalMapStats {
        self.container.executor().local_stats()
    }
}
