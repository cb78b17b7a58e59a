//! Partitioned entry storage.
//!
//! Keys are routed to a partition by their hash; each partition is guarded by
//! its own mutex so operations on different partitions run in parallel while
//! operations on one key are linearizable.

mod partition;
mod record;
mod sweeper;

pub use partition::{EntryUpdate, LockedPartition};
pub use record::{EntryView, Record, Ttl};
pub use sweeper::ExpirySweeper;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use hazelmap_core::{Data, EntryEventType};

use crate::listener::{EntryEvent, EventDispatcher};
use partition::Records;

pub(crate) struct StoreShared {
    name: String,
    default_ttl: Option<Duration>,
    dispatcher: Arc<EventDispatcher>,
}

/// The records of one map, split into partitions.
pub struct EntryStore {
    shared: StoreShared,
    partitions: Box<[Mutex<Records>]>,
    owned_partitions: RwLock<Option<HashSet<u32>>>,
}

impl EntryStore {
    /// Creates an empty store.
    ///
    /// Every mutation publishes its event through `dispatcher`.
    pub fn new(
        name: impl Into<String>,
        partition_count: u32,
        default_ttl: Option<Duration>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let partitions = (0..partition_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shared: StoreShared {
                name: name.into(),
                default_ttl,
                dispatcher,
            },
            partitions,
            owned_partitions: RwLock::new(None),
        }
    }

    /// Returns the map name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the number of partitions.
    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    /// Returns the TTL applied to writes that do not carry their own.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.shared.default_ttl
    }

    /// Returns the dispatcher events are published through.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.shared.dispatcher
    }

    /// Returns the partition a key belongs to.
    pub fn partition_id(&self, key: &Data) -> u32 {
        key.partition_id(self.partition_count())
    }

    /// Locks a partition.
    ///
    /// Panics if `partition_id` is out of range.
    pub fn lock_partition(&self, partition_id: u32) -> LockedPartition<'_> {
        let records = self.partitions[partition_id as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        LockedPartition::new(partition_id, records, &self.shared)
    }

    /// Locks the partition owning `key`.
    pub fn partition_for(&self, key: &Data) -> LockedPartition<'_> {
        self.lock_partition(self.partition_id(key))
    }

    /// Restricts the partitions this member reports as local.
    ///
    /// `None` (the default) means every partition is local.
    pub fn set_owned_partitions(&self, owned: Option<HashSet<u32>>) {
        *self
            .owned_partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = owned;
    }

    /// Returns `true` if this member owns the partition.
    pub fn is_owned(&self, partition_id: u32) -> bool {
        self.owned_partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, |owned| owned.contains(&partition_id))
    }

    /// Reads a value.
    pub fn get(&self, key: &Data) -> Option<Data> {
        self.partition_for(key).get(key)
    }

    /// Writes a value and returns the previous one.
    pub fn put(&self, key: Data, value: Data, ttl: Ttl) -> Option<Data> {
        self.partition_for(&key).put(key, value, ttl)
    }

    /// Writes a value without reading the previous one.
    pub fn set(&self, key: Data, value: Data, ttl: Ttl) {
        self.partition_for(&key).set(key, value, ttl)
    }

    /// Writes only if the key has no live value.
    pub fn put_if_absent(&self, key: Data, value: Data, ttl: Ttl) -> Option<Data> {
        self.partition_for(&key).put_if_absent(key, value, ttl)
    }

    /// Replaces the value of an existing key.
    pub fn replace(&self, key: Data, value: Data) -> Option<Data> {
        self.partition_for(&key).replace(key, value)
    }

    /// Replaces the value only if it equals `expected`.
    pub fn replace_if_same(&self, key: Data, expected: &Data, value: Data) -> bool {
        self.partition_for(&key).replace_if_same(key, expected, value)
    }

    /// Removes a key and returns its value.
    pub fn remove(&self, key: &Data) -> Option<Data> {
        self.partition_for(key).remove(key)
    }

    /// Removes a key only if its value equals `expected`.
    pub fn remove_if_same(&self, key: &Data, expected: &Data) -> bool {
        self.partition_for(key).remove_if_same(key, expected)
    }

    /// Evicts a key.
    pub fn evict(&self, key: &Data) -> bool {
        self.partition_for(key).evict(key)
    }

    /// Returns `true` if the key has a live value.
    pub fn contains_key(&self, key: &Data) -> bool {
        self.partition_for(key).contains_key(key)
    }

    /// Returns `true` if any live entry holds `value`.
    pub fn contains_value(&self, value: &Data) -> bool {
        (0..self.partition_count()).any(|id| {
            let mut found = false;
            self.lock_partition(id).for_each_live(|_, record| {
                found |= record.value() == value;
            });
            found
        })
    }

    /// Returns a snapshot of the entry and its metadata.
    pub fn entry_view(&self, key: &Data) -> Option<EntryView> {
        self.partition_for(key).entry_view(key)
    }

    /// Reads several keys. Absent keys are left out of the result.
    pub fn get_all<'k>(&self, keys: impl IntoIterator<Item = &'k Data>) -> HashMap<Data, Data> {
        keys.into_iter()
            .filter_map(|key| self.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Writes several entries with the map default TTL.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (Data, Data)>) {
        for (key, value) in entries {
            self.set(key, value, Ttl::MapDefault);
        }
    }

    /// Returns the number of live entries.
    pub fn size(&self) -> usize {
        (0..self.partition_count())
            .map(|id| self.lock_partition(id).live_count())
            .sum()
    }

    /// Returns `true` if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Removes every entry. Publishes one `ClearAll` event with the count.
    pub fn clear(&self) -> usize {
        self.drain_all(EntryEventType::ClearAll, |_| false)
    }

    /// Removes every entry for which `keep` returns `false`.
    pub fn clear_except(&self, keep: impl Fn(&Data) -> bool) -> usize {
        self.drain_all(EntryEventType::ClearAll, keep)
    }

    /// Evicts every entry. Publishes one `EvictAll` event with the count.
    pub fn evict_all(&self) -> usize {
        self.drain_all(EntryEventType::EvictAll, |_| false)
    }

    /// Evicts every entry for which `keep` returns `false`.
    pub fn evict_all_except(&self, keep: impl Fn(&Data) -> bool) -> usize {
        self.drain_all(EntryEventType::EvictAll, keep)
    }

    fn drain_all(&self, event_type: EntryEventType, keep: impl Fn(&Data) -> bool) -> usize {
        let affected: usize = (0..self.partition_count())
            .map(|id| self.lock_partition(id).drain_live(&keep))
            .sum();
        tracing::debug!(map = %self.name(), event = %event_type, affected, "drained map");

        let dispatcher = self.dispatcher();
        if dispatcher.has_listeners() {
            dispatcher.publish(&EntryEvent::map_wide(
                self.name(),
                event_type,
                i32::try_from(affected).unwrap_or(i32::MAX),
                dispatcher.member_id(),
            ));
        }
        affected
    }

    /// Purges every expired entry. Returns how many were purged.
    pub fn purge_expired(&self) -> usize {
        (0..self.partition_count())
            .map(|id| self.lock_partition(id).purge_expired())
            .sum()
    }

    /// Visits every live entry, optionally only in owned partitions.
    ///
    /// Partitions are visited one at a time, each under its own lock.
    pub fn scan(&self, local_only: bool, mut f: impl FnMut(&Data, &Record)) {
        for id in 0..self.partition_count() {
            if local_only && !self.is_owned(id) {
                continue;
            }
            self.lock_partition(id).for_each_live(&mut f);
        }
    }

    /// Returns the keys held in owned partitions.
    pub fn local_keys(&self) -> HashSet<Data> {
        let mut keys = HashSet::new();
        self.scan(true, |key, _| {
            keys.insert(key.clone());
        });
        keys
    }
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("name", &self.shared.name)
            .field("partitions", &self.partitions.len())
            .field("default_ttl", &self.shared.default_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{FnEntryListener, ListenerRegistry, LocalEndpoints, RegistrationSpec};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    fn store_with_events() -> (EntryStore, Arc<StdMutex<Vec<EntryEvent>>>) {
        let registry = Arc::new(ListenerRegistry::new("m"));
        let dispatcher = Arc::new(EventDispatcher::new(
            registry.clone(),
            Arc::new(LocalEndpoints::new()),
            Uuid::new_v4(),
            16,
        ));
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = |events: &Arc<StdMutex<Vec<EntryEvent>>>| {
            let events = Arc::clone(events);
            move |e: EntryEvent| events.lock().unwrap().push(e)
        };
        registry.add(RegistrationSpec::local(Arc::new(
            FnEntryListener::builder()
                .on_added(sink(&events))
                .on_updated(sink(&events))
                .on_removed(sink(&events))
                .on_evicted(sink(&events))
                .on_expired(sink(&events))
                .on_map_cleared(sink(&events))
                .on_map_evicted(sink(&events))
                .build(),
        )));
        (EntryStore::new("m", 16, None, dispatcher), events)
    }

    fn types(events: &StdMutex<Vec<EntryEvent>>) -> Vec<EntryEventType> {
        events.lock().unwrap().iter().map(|e| e.event_type).collect()
    }

    fn d(s: &'static str) -> Data {
        Data::from(s)
    }

    #[test]
    fn test_put_get_last_write_wins() {
        let (store, events) = store_with_events();
        assert_eq!(store.put(d("k"), d("v1"), Ttl::MapDefault), None);
        assert_eq!(store.put(d("k"), d("v2"), Ttl::MapDefault), Some(d("v1")));
        assert_eq!(store.get(&d("k")), Some(d("v2")));
        assert_eq!(store.entry_view(&d("k")).unwrap().version, 2);
        assert_eq!(types(&events), vec![EntryEventType::Added, EntryEventType::Updated]);
    }

    #[test]
    fn test_put_if_absent() {
        let (store, _) = store_with_events();
        assert_eq!(store.put_if_absent(d("k"), d("a"), Ttl::MapDefault), None);
        assert_eq!(store.put_if_absent(d("k"), d("b"), Ttl::MapDefault), Some(d("a")));
        assert_eq!(store.get(&d("k")), Some(d("a")));
    }

    #[test]
    fn test_replace_variants() {
        let (store, _) = store_with_events();
        assert_eq!(store.replace(d("k"), d("x")), None);
        assert!(!store.contains_key(&d("k")));

        store.put(d("k"), d("a"), Ttl::MapDefault);
        assert!(!store.replace_if_same(d("k"), &d("b"), d("c")));
        assert!(store.replace_if_same(d("k"), &d("a"), d("c")));
        assert_eq!(store.replace(d("k"), d("e")), Some(d("c")));
        assert_eq!(store.get(&d("k")), Some(d("e")));
    }

    #[test]
    fn test_remove_variants() {
        let (store, events) = store_with_events();
        store.put(d("k"), d("a"), Ttl::MapDefault);
        assert!(!store.remove_if_same(&d("k"), &d("b")));
        assert!(store.remove_if_same(&d("k"), &d("a")));
        assert_eq!(store.remove(&d("k")), None);
        assert_eq!(types(&events), vec![EntryEventType::Added, EntryEventType::Removed]);
    }

    #[test]
    fn test_evict_publishes_evicted() {
        let (store, events) = store_with_events();
        store.put(d("k"), d("a"), Ttl::MapDefault);
        assert!(store.evict(&d("k")));
        assert!(!store.evict(&d("k")));
        assert_eq!(types(&events), vec![EntryEventType::Added, EntryEventType::Evicted]);
    }

    #[test]
    fn test_contains_value_and_bulk_ops() {
        let (store, _) = store_with_events();
        store.put_all([(d("a"), d("1")), (d("b"), d("2"))]);
        assert!(store.contains_value(&d("2")));
        assert!(!store.contains_value(&d("3")));

        let keys = [d("a"), d("b"), d("c")];
        let all = store.get_all(keys.iter());
        assert_eq!(all.len(), 2);
        assert_eq!(all[&d("a")], d("1"));
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn test_clear_publishes_one_map_wide_event() {
        let (store, events) = store_with_events();
        store.put(d("a"), d("1"), Ttl::MapDefault);
        store.put(d("b"), d("2"), Ttl::MapDefault);
        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());

        let events = events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.event_type, EntryEventType::ClearAll);
        assert_eq!(last.affected_count, 2);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_evict_all() {
        let (store, events) = store_with_events();
        store.put(d("a"), d("1"), Ttl::MapDefault);
        assert_eq!(store.evict_all(), 1);
        assert_eq!(types(&events).last(), Some(&EntryEventType::EvictAll));
    }

    #[test]
    fn test_clear_except_keeps_selected_keys() {
        let (store, events) = store_with_events();
        store.put(d("a"), d("1"), Ttl::MapDefault);
        store.put(d("b"), d("2"), Ttl::MapDefault);
        assert_eq!(store.clear_except(|key| key == &d("b")), 1);
        assert_eq!(store.get(&d("b")), Some(d("2")));
        assert_eq!(events.lock().unwrap().last().unwrap().affected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_absent_and_fires_once() {
        let (store, events) = store_with_events();
        store.put(d("k"), d("v"), Ttl::After(Duration::from_secs(1)));
        assert_eq!(store.get(&d("k")), Some(d("v")));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get(&d("k")), None);
        assert_eq!(store.get(&d("k")), None);
        assert!(!store.contains_key(&d("k")));
        assert_eq!(store.purge_expired(), 0);

        let expired = types(&events)
            .into_iter()
            .filter(|t| *t == EntryEventType::Expired)
            .count();
        assert_eq!(expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies() {
        let registry = Arc::new(ListenerRegistry::new("m"));
        let dispatcher = Arc::new(EventDispatcher::new(
            registry,
            Arc::new(LocalEndpoints::new()),
            Uuid::new_v4(),
            4,
        ));
        let store = EntryStore::new("m", 4, Some(Duration::from_secs(5)), dispatcher);
        store.put(d("short"), d("v"), Ttl::MapDefault);
        store.put(d("forever"), d("v"), Ttl::Infinite);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.size(), 1);
        assert_eq!(store.purge_expired(), 1);
        assert!(store.contains_key(&d("forever")));
    }

    #[test]
    fn test_local_keys_respect_ownership() {
        let (store, _) = store_with_events();
        store.put(d("a"), d("1"), Ttl::MapDefault);
        store.put(d("b"), d("2"), Ttl::MapDefault);
        assert_eq!(store.local_keys().len(), 2);

        let owned: HashSet<u32> = [store.partition_id(&d("a"))].into_iter().collect();
        let b_owned = owned.contains(&store.partition_id(&d("b")));
        store.set_owned_partitions(Some(owned));
        let local = store.local_keys();
        assert!(local.contains(&d("a")));
        assert_eq!(local.contains(&d("b")), b_owned);
    }

    #[test]
    fn test_compute() {
        let (store, events) = store_with_events();
        let result = store
            .partition_for(&d("n"))
            .compute(d("n"), |current| {
                assert!(current.is_none());
                (EntryUpdate::Set(d("1")), "created")
            });
        assert_eq!(result, "created");
        store.partition_for(&d("n")).compute(d("n"), |_| (EntryUpdate::Remove, ()));
        assert_eq!(store.get(&d("n")), None);
        assert_eq!(types(&events), vec![EntryEventType::Added, EntryEventType::Removed]);
    }
}
