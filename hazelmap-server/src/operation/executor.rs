//! Executes map operations against the entry store and lock table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hazelmap_core::{Data, HazelmapError, Result};
use tokio::time::Instant;

use super::entry_processor::{EntryProcessor, EntryProcessorResult, MapEntry};
use super::future::MapFuture;
use super::interceptor::InterceptorChain;
use super::stats::{LocalMapStats, MapStatsTracker};
use crate::lock::{LockOwner, LockTable};
use crate::store::{EntryStore, EntryView, LockedPartition, Ttl};

/// Runs map operations for one map.
///
/// Reads never wait. A mutation of a key that another owner holds a lock on
/// waits until the lock is released, for at most the configured operation
/// timeout. The check happens with the partition lock held, so a mutation by
/// a non-owner can never land while the key is locked.
#[derive(Debug)]
pub struct OperationExecutor {
    store: Arc<EntryStore>,
    locks: Arc<LockTable>,
    interceptors: InterceptorChain,
    stats: MapStatsTracker,
    operation_timeout: Duration,
}

impl OperationExecutor {
    /// Creates an executor over the given store and lock table.
    pub fn new(store: Arc<EntryStore>, locks: Arc<LockTable>, operation_timeout: Duration) -> Self {
        Self {
            store,
            locks,
            interceptors: InterceptorChain::new(),
            stats: MapStatsTracker::default(),
            operation_timeout,
        }
    }

    /// Returns the store this executor writes to.
    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    /// Returns the lock table consulted before mutations.
    pub fn locks(&self) -> &Arc<LockTable> {
        &self.locks
    }

    /// Returns the registered interceptors.
    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Returns how long a mutation waits for a foreign key lock.
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Locks the partition of `key` once no other owner holds the key lock.
    async fn writable(&self, key: &Data, caller: LockOwner, timeout: Duration) -> Result<LockedPartition<'_>> {
        // Timeouts too large to represent wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let released = self.locks.released().notified();
            tokio::pin!(released);
            released.as_mut().enable();
            {
                let partition = self.store.partition_for(key);
                if !self.locks.is_locked_by_other(key, caller) {
                    return Ok(partition);
                }
            }
            tracing::trace!(map = %self.store.name(), caller = %caller, "waiting for foreign key lock");
            let expired = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, released).await.is_err(),
                None => {
                    released.await;
                    false
                }
            };
            if expired {
                return Err(HazelmapError::Timeout(format!(
                    "key in map '{}' stayed locked by another owner for {:?}",
                    self.store.name(),
                    timeout
                )));
            }
        }
    }

    fn intercept_put(&self, partition: &mut LockedPartition<'_>, key: &Data, value: Data) -> Data {
        if self.interceptors.is_empty() {
            return value;
        }
        let old = partition.peek(key);
        self.interceptors.on_put(old.as_ref(), value)
    }

    // Reads

    /// Reads a value.
    pub fn get(&self, key: &Data) -> Option<Data> {
        let value = self.store.partition_for(key).get(key);
        self.stats.record_get(value.is_some());
        self.interceptors.on_get(value)
    }

    /// Reads several keys. Absent keys are left out of the result.
    pub fn get_all<'k>(&self, keys: impl IntoIterator<Item = &'k Data>) -> HashMap<Data, Data> {
        keys.into_iter()
            .filter_map(|key| self.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Returns `true` if the key has a live value.
    pub fn contains_key(&self, key: &Data) -> bool {
        self.store.contains_key(key)
    }

    /// Returns `true` if any live entry holds `value`.
    pub fn contains_value(&self, value: &Data) -> bool {
        self.store.contains_value(value)
    }

    /// Returns the entry with its metadata.
    pub fn get_entry_view(&self, key: &Data) -> Option<EntryView> {
        self.store.entry_view(key)
    }

    // Writes

    /// Writes a value and returns the previous one.
    pub async fn put(&self, caller: LockOwner, key: Data, value: Data, ttl: Ttl) -> Result<Option<Data>> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        let value = self.intercept_put(&mut partition, &key, value);
        let old = partition.put(key, value, ttl);
        self.stats.record_put();
        Ok(old)
    }

    /// Writes a value without reading the previous one.
    pub async fn set(&self, caller: LockOwner, key: Data, value: Data, ttl: Ttl) -> Result<()> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        let value = self.intercept_put(&mut partition, &key, value);
        partition.set(key, value, ttl);
        self.stats.record_put();
        Ok(())
    }

    /// Writes a value that is not backed up to replicas.
    pub async fn put_transient(&self, caller: LockOwner, key: Data, value: Data, ttl: Ttl) -> Result<()> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        let value = self.intercept_put(&mut partition, &key, value);
        partition.put_transient(key, value, ttl);
        self.stats.record_put();
        Ok(())
    }

    /// Writes only if the key is absent. Returns the existing value otherwise.
    pub async fn put_if_absent(&self, caller: LockOwner, key: Data, value: Data, ttl: Ttl) -> Result<Option<Data>> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        if let Some(existing) = partition.peek(&key) {
            return Ok(Some(existing));
        }
        let value = self.intercept_put(&mut partition, &key, value);
        let previous = partition.put_if_absent(key, value, ttl);
        self.stats.record_put();
        Ok(previous)
    }

    /// Writes a value, waiting at most `timeout` for a foreign key lock.
    ///
    /// Returns `false` if the key stayed locked; nothing is written then.
    pub async fn try_put(&self, caller: LockOwner, key: Data, value: Data, timeout: Duration) -> Result<bool> {
        let mut partition = match self.writable(&key, caller, timeout).await {
            Ok(partition) => partition,
            Err(err) if err.is_timeout() => return Ok(false),
            Err(err) => return Err(err),
        };
        let value = self.intercept_put(&mut partition, &key, value);
        partition.set(key, value, Ttl::MapDefault);
        self.stats.record_put();
        Ok(true)
    }

    /// Writes several entries with the map default TTL.
    pub async fn put_all(&self, caller: LockOwner, entries: impl IntoIterator<Item = (Data, Data)>) -> Result<()> {
        for (key, value) in entries {
            self.set(caller, key, value, Ttl::MapDefault).await?;
        }
        Ok(())
    }

    /// Replaces the value of an existing key. Missing keys stay absent.
    pub async fn replace(&self, caller: LockOwner, key: Data, value: Data) -> Result<Option<Data>> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        if !partition.contains_key(&key) {
            return Ok(None);
        }
        let value = self.intercept_put(&mut partition, &key, value);
        let old = partition.replace(key, value);
        self.stats.record_put();
        Ok(old)
    }

    /// Replaces the value only if it currently equals `expected`.
    pub async fn replace_if_same(&self, caller: LockOwner, key: Data, expected: Data, value: Data) -> Result<bool> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        if partition.peek(&key).as_ref() != Some(&expected) {
            return Ok(false);
        }
        let value = self.intercept_put(&mut partition, &key, value);
        let replaced = partition.replace_if_same(key, &expected, value);
        if replaced {
            self.stats.record_put();
        }
        Ok(replaced)
    }

    /// Removes a key and returns its value.
    pub async fn remove(&self, caller: LockOwner, key: Data) -> Result<Option<Data>> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        let removed = partition.remove(&key);
        self.interceptors.on_remove(removed.as_ref());
        if removed.is_some() {
            self.stats.record_remove();
        }
        Ok(removed)
    }

    /// Removes a key without returning its value.
    pub async fn delete(&self, caller: LockOwner, key: Data) -> Result<()> {
        self.remove(caller, key).await.map(drop)
    }

    /// Removes a key only if its value equals `expected`.
    pub async fn remove_if_same(&self, caller: LockOwner, key: Data, expected: Data) -> Result<bool> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        let removed = partition.remove_if_same(&key, &expected);
        if removed {
            self.interceptors.on_remove(Some(&expected));
            self.stats.record_remove();
        }
        Ok(removed)
    }

    /// Removes a key, waiting at most `timeout` for a foreign key lock.
    ///
    /// Fails with `Timeout` if the key stayed locked, which is distinct from
    /// `Ok(None)` for a key that had no value.
    pub async fn try_remove(&self, caller: LockOwner, key: Data, timeout: Duration) -> Result<Option<Data>> {
        let mut partition = self.writable(&key, caller, timeout).await?;
        let removed = partition.remove(&key);
        self.interceptors.on_remove(removed.as_ref());
        if removed.is_some() {
            self.stats.record_remove();
        }
        Ok(removed)
    }

    /// Evicts a key. Locked keys are not evicted.
    pub fn evict(&self, key: &Data) -> bool {
        let mut partition = self.store.partition_for(key);
        if self.locks.is_locked(key) {
            return false;
        }
        partition.evict(key)
    }

    /// Evicts every unlocked entry. Returns how many were evicted.
    pub fn evict_all(&self) -> usize {
        self.store.evict_all_except(|key| self.locks.is_locked(key))
    }

    /// Removes every unlocked entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.store.clear_except(|key| self.locks.is_locked(key))
    }

    /// Runs `processor` on one entry atomically and returns its result.
    pub async fn execute_on_key(&self, caller: LockOwner, key: Data, processor: &dyn EntryProcessor) -> Result<Option<Data>> {
        let mut partition = self.writable(&key, caller, self.operation_timeout).await?;
        let result = partition.compute(key.clone(), |current| {
            let mut entry = MapEntry::new(key, current.cloned());
            let result = processor.process(&mut entry);
            (entry.into_update(), result)
        });
        Ok(result)
    }

    /// Runs `processor` on each key in turn.
    pub async fn execute_on_keys(
        &self,
        caller: LockOwner,
        keys: impl IntoIterator<Item = Data>,
        processor: &dyn EntryProcessor,
    ) -> Result<EntryProcessorResult> {
        let mut results = HashMap::new();
        for key in keys {
            if let Some(result) = self.execute_on_key(caller, key.clone(), processor).await? {
                results.insert(key, result);
            }
        }
        Ok(EntryProcessorResult::new(results))
    }

    /// Returns a snapshot of the operation statistics.
    pub fn local_stats(&self) -> LocalMapStats {
        let mut owned = 0u64;
        self.store.scan(true, |_, _| owned += 1);
        self.stats.snapshot(owned, self.locks.locked_count() as u64)
    }

    // Non-blocking variants

    /// Starts a read and returns immediately.
    pub fn get_async(self: &Arc<Self>, key: Data) -> MapFuture<Option<Data>> {
        let this = Arc::clone(self);
        MapFuture::spawn(async move { Ok(this.get(&key)) })
    }

    /// Starts a [`put`](Self::put) and returns immediately.
    pub fn put_async(self: &Arc<Self>, caller: LockOwner, key: Data, value: Data, ttl: Ttl) -> MapFuture<Option<Data>> {
        let this = Arc::clone(self);
        MapFuture::spawn(async move { this.put(caller, key, value, ttl).await })
    }

    /// Starts a [`set`](Self::set) and returns immediately.
    pub fn set_async(self: &Arc<Self>, caller: LockOwner, key: Data, value: Data, ttl: Ttl) -> MapFuture<()> {
        let this = Arc::clone(self);
        MapFuture::spawn(async move { this.set(caller, key, value, ttl).await })
    }

    /// Starts a [`put_if_absent`](Self::put_if_absent) and returns immediately.
    pub fn put_if_absent_async(
        self: &Arc<Self>,
        caller: LockOwner,
        key: Data,
        value: Data,
        ttl: Ttl,
    ) -> MapFuture<Option<Data>> {
        let this = Arc::clone(self);
        MapFuture::spawn(async move { this.put_if_absent(caller, key, value, ttl).await })
    }

    /// Starts a [`replace`](Self::replace) and returns immediately.
    pub fn replace_async(self: &Arc<Self>, caller: LockOwner, key: Data, value: Data) -> MapFuture<Option<Data>> {
        let this = Arc::clone(self);
        MapFuture::spawn(async move { this.replace(caller, key, value).await })
    }

    /// Starts a [`remove`](Self::remove) and returns immediately.
    pub fn remove_async(self: &Arc<Self>, caller: LockOwner, key: Data) -> MapFuture<Option<Data>> {
        let this = Arc::clone(self);
        MapFuture::spawn(async move { this.remove(caller, key).await })
    }

    /// Starts a [`delete`](Self::delete) and returns immediately.
    pub fn delete_async(self: &Arc<Self>, caller: LockOwner, key: Data) -> MapFuture<()> {
        let this = Arc::clone(self);
        MapFuture::spawn(async move { this.delete(caller, key).await })
    }

    /// Starts an [`execute_on_key`](Self::execute_on_key) and returns immediately.
    pub fn execute_on_key_async(
        self: &Arc<Self>,
        caller: LockOwner,
        key: Data,
        processor: Arc<dyn EntryProcessor>,
    ) -> MapFuture<Option<Data>> {
        let this = Arc::clone(self);
        MapFuture::spawn(async move { this.execute_on_key(caller, key, processor.as_ref()).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{EndpointId, EventDispatcher, ListenerRegistry, LocalEndpoints};
    use crate::operation::MapInterceptor;
    use uuid::Uuid;

    fn d(s: &'static str) -> Data {
        Data::from(s)
    }

    fn executor(timeout: Duration) -> Arc<OperationExecutor> {
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::new(ListenerRegistry::new("m")),
            Arc::new(LocalEndpoints::new()),
            Uuid::new_v4(),
            16,
        ));
        let store = Arc::new(EntryStore::new("m", 16, None, dispatcher));
        Arc::new(OperationExecutor::new(store, Arc::new(LockTable::new()), timeout))
    }

    fn caller(thread_id: i64) -> LockOwner {
        LockOwner::new(EndpointId::from_uuid(Uuid::nil()), thread_id)
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let ex = executor(Duration::from_secs(1));
        assert_eq!(ex.put(caller(1), d("k"), d("a"), Ttl::MapDefault).await.unwrap(), None);
        assert_eq!(ex.put(caller(2), d("k"), d("b"), Ttl::MapDefault).await.unwrap(), Some(d("a")));
        assert_eq!(ex.get(&d("k")), Some(d("b")));
        assert_eq!(ex.remove(caller(1), d("k")).await.unwrap(), Some(d("b")));
        assert_eq!(ex.get(&d("k")), None);

        let stats = ex.local_stats();
        assert_eq!(stats.puts, 2);
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.removes, 1);
    }

    #[tokio::test]
    async fn test_remove_of_absent_key_is_not_counted() {
        let ex = executor(Duration::from_secs(1));
        assert_eq!(ex.remove(caller(1), d("missing")).await.unwrap(), None);
        assert_eq!(
            ex.try_remove(caller(1), d("missing"), Duration::from_millis(10)).await.unwrap(),
            None
        );
        assert_eq!(ex.local_stats().removes, 0);

        ex.put(caller(1), d("k"), d("v"), Ttl::MapDefault).await.unwrap();
        ex.try_remove(caller(1), d("k"), Duration::from_millis(10)).await.unwrap();
        assert_eq!(ex.local_stats().removes, 1);
    }

    #[tokio::test]
    async fn test_owner_writes_through_own_lock() {
        let ex = executor(Duration::from_millis(50));
        ex.locks().try_lock(&d("k"), caller(1));
        ex.put(caller(1), d("k"), d("v"), Ttl::MapDefault).await.unwrap();
        assert_eq!(ex.get(&d("k")), Some(d("v")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_lock_times_out_mutation() {
        let ex = executor(Duration::from_millis(50));
        ex.locks().try_lock(&d("k"), caller(1));
        let err = ex.put(caller(2), d("k"), d("v"), Ttl::MapDefault).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(ex.get(&d("k")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_put_and_try_remove_on_locked_key() {
        let ex = executor(Duration::from_secs(60));
        ex.set(caller(1), d("k"), d("v"), Ttl::MapDefault).await.unwrap();
        ex.locks().try_lock(&d("k"), caller(1));

        assert!(!ex.try_put(caller(2), d("k"), d("w"), Duration::ZERO).await.unwrap());
        let err = ex
            .try_remove(caller(2), d("k"), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(ex.get(&d("k")), Some(d("v")));

        assert_eq!(ex.try_remove(caller(2), d("absent"), Duration::ZERO).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_waiting_mutation_proceeds_after_unlock() {
        let ex = executor(Duration::from_secs(5));
        ex.locks().try_lock(&d("k"), caller(1));

        let pending = ex.put_async(caller(2), d("k"), d("v"), Ttl::MapDefault);
        tokio::task::yield_now().await;
        assert!(!pending.is_done());

        ex.locks().unlock(&d("k"), caller(1)).unwrap();
        assert_eq!(pending.await.unwrap(), None);
        assert_eq!(ex.get(&d("k")), Some(d("v")));
    }

    #[tokio::test]
    async fn test_replace_variants() {
        let ex = executor(Duration::from_secs(1));
        assert_eq!(ex.replace(caller(1), d("k"), d("v")).await.unwrap(), None);
        assert!(!ex.contains_key(&d("k")));

        ex.set(caller(1), d("k"), d("a"), Ttl::MapDefault).await.unwrap();
        assert!(!ex.replace_if_same(caller(1), d("k"), d("x"), d("b")).await.unwrap());
        assert!(ex.replace_if_same(caller(1), d("k"), d("a"), d("b")).await.unwrap());
        assert_eq!(ex.replace(caller(1), d("k"), d("c")).await.unwrap(), Some(d("b")));
        assert!(ex.contains_value(&d("c")));
    }

    #[tokio::test]
    async fn test_locked_keys_survive_clear_and_evict() {
        let ex = executor(Duration::from_secs(1));
        ex.set(caller(1), d("a"), d("1"), Ttl::MapDefault).await.unwrap();
        ex.set(caller(1), d("b"), d("2"), Ttl::MapDefault).await.unwrap();
        ex.locks().try_lock(&d("a"), caller(1));

        assert!(!ex.evict(&d("a")));
        assert_eq!(ex.clear(), 1);
        assert_eq!(ex.get(&d("a")), Some(d("1")));
        assert_eq!(ex.get(&d("b")), None);
    }

    #[tokio::test]
    async fn test_execute_on_key() {
        let ex = executor(Duration::from_secs(1));
        ex.set(caller(1), d("k"), d("1"), Ttl::MapDefault).await.unwrap();

        let append = |entry: &mut MapEntry| {
            let mut bytes = entry.value()?.as_bytes().to_vec();
            bytes.push(b'!');
            entry.set_value(Data::from(bytes));
            entry.value().cloned()
        };
        let result = ex.execute_on_key(caller(1), d("k"), &append).await.unwrap();
        assert_eq!(result, Some(d("1!")));
        assert_eq!(ex.get_entry_view(&d("k")).unwrap().version, 2);

        let results = ex
            .execute_on_keys(caller(1), [d("k"), d("missing")], &append)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.get(&d("k")), Some(&d("1!!")));
        assert!(!ex.contains_key(&d("missing")));
    }

    struct Tag;

    impl MapInterceptor for Tag {
        fn intercept_put(&self, old_value: Option<&Data>, new_value: Data) -> Data {
            match old_value {
                Some(_) => Data::from(format!("updated:{:?}", new_value.as_bytes()).into_bytes()),
                None => new_value,
            }
        }
    }

    #[tokio::test]
    async fn test_interceptor_sees_old_value() {
        let ex = executor(Duration::from_secs(1));
        ex.interceptors().add(Arc::new(Tag));
        ex.set(caller(1), d("k"), d("a"), Ttl::MapDefault).await.unwrap();
        assert_eq!(ex.get(&d("k")), Some(d("a")));
        ex.set(caller(1), d("k"), d("b"), Ttl::MapDefault).await.unwrap();
        assert_ne!(ex.get(&d("k")), Some(d("b")));
    }

    #[test]
    fn test_executor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OperationExecutor>();
        assert_send_sync::<MapFuture<Option<Data>>>();
    }
}
