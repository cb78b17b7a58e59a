//! Mutations on a single locked partition.

use std::collections::HashMap;
use std::sync::MutexGuard;

use hazelmap_core::{Data, EntryEventType};
use tokio::time::Instant;

use super::record::{EntryView, Record, Ttl};
use super::StoreShared;
use crate::listener::EntryEvent;

/// Records of one partition.
pub(crate) type Records = HashMap<Data, Record>;

/// Outcome of an in-place entry computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryUpdate {
    /// Leave the entry as it is.
    Keep,
    /// Store a new value, keeping the current expiry of an existing entry.
    Set(Data),
    /// Remove the entry.
    Remove,
}

/// Exclusive access to the records of one partition.
///
/// Every mutation goes through here and publishes its event before the
/// partition lock is released, so listeners observe changes to a key in the
/// order they were applied. Expired records are purged on first touch and
/// publish `Expired` exactly once.
pub struct LockedPartition<'a> {
    id: u32,
    records: MutexGuard<'a, Records>,
    shared: &'a StoreShared,
}

impl<'a> LockedPartition<'a> {
    pub(crate) fn new(id: u32, records: MutexGuard<'a, Records>, shared: &'a StoreShared) -> Self {
        Self { id, records, shared }
    }

    /// Returns the partition id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the live record for `key`, purging it first if it has expired.
    fn live(&mut self, key: &Data) -> Option<&mut Record> {
        let now = Instant::now();
        if self.records.get(key).is_some_and(|r| r.is_expired(now)) {
            if let Some(record) = self.records.remove(key) {
                self.publish(EntryEventType::Expired, key.clone(), Some(record.value().clone()), None);
            }
            return None;
        }
        self.records.get_mut(key)
    }

    fn publish(&self, event_type: EntryEventType, key: Data, old: Option<Data>, new: Option<Data>) {
        let dispatcher = &self.shared.dispatcher;
        if !dispatcher.has_listeners() {
            return;
        }
        dispatcher.publish(&EntryEvent::entry(
            &self.shared.name,
            event_type,
            key,
            old,
            new,
            dispatcher.member_id(),
        ));
    }

    fn write(&mut self, key: Data, value: Data, ttl: Ttl, transient: bool) -> Option<Data> {
        let ttl = ttl.resolve(self.shared.default_ttl);
        let now = Instant::now();
        match self.live(&key) {
            Some(record) => {
                let old = record.update(value.clone(), ttl, transient, now);
                self.publish(EntryEventType::Updated, key, Some(old.clone()), Some(value));
                Some(old)
            }
            None => {
                self.records
                    .insert(key.clone(), Record::new(value.clone(), ttl, transient, now));
                self.publish(EntryEventType::Added, key, None, Some(value));
                None
            }
        }
    }

    /// Reads a value, counting the access.
    pub fn get(&mut self, key: &Data) -> Option<Data> {
        self.live(key).map(|record| {
            record.touch();
            record.value().clone()
        })
    }

    /// Reads a value without counting the access.
    pub fn peek(&mut self, key: &Data) -> Option<Data> {
        self.live(key).map(|record| record.value().clone())
    }

    /// Returns a snapshot of the entry and its metadata.
    pub fn entry_view(&mut self, key: &Data) -> Option<EntryView> {
        self.live(key).map(|record| record.view(key))
    }

    /// Writes a value and returns the previous one.
    pub fn put(&mut self, key: Data, value: Data, ttl: Ttl) -> Option<Data> {
        self.write(key, value, ttl, false)
    }

    /// Writes a value without handing back the previous one.
    pub fn set(&mut self, key: Data, value: Data, ttl: Ttl) {
        self.write(key, value, ttl, false);
    }

    /// Writes a value flagged as not backed up.
    pub fn put_transient(&mut self, key: Data, value: Data, ttl: Ttl) {
        self.write(key, value, ttl, true);
    }

    /// Writes only if the key has no live value. Returns the existing value otherwise.
    pub fn put_if_absent(&mut self, key: Data, value: Data, ttl: Ttl) -> Option<Data> {
        if let Some(existing) = self.peek(&key) {
            return Some(existing);
        }
        self.write(key, value, ttl, false)
    }

    /// Replaces the value of an existing key. Missing keys are left absent.
    pub fn replace(&mut self, key: Data, value: Data) -> Option<Data> {
        let record = self.live(&key)?;
        let old = record.replace_value(value.clone());
        self.publish(EntryEventType::Updated, key, Some(old.clone()), Some(value));
        Some(old)
    }

    /// Replaces the value only if it equals `expected` byte for byte.
    pub fn replace_if_same(&mut self, key: Data, expected: &Data, value: Data) -> bool {
        match self.live(&key) {
            Some(record) if record.value() == expected => {
                let old = record.replace_value(value.clone());
                self.publish(EntryEventType::Updated, key, Some(old), Some(value));
                true
            }
            _ => false,
        }
    }

    /// Removes a key and returns its value.
    pub fn remove(&mut self, key: &Data) -> Option<Data> {
        self.live(key)?;
        let record = self.records.remove(key)?;
        let old = record.value().clone();
        self.publish(EntryEventType::Removed, key.clone(), Some(old.clone()), None);
        Some(old)
    }

    /// Removes a key only if its value equals `expected` byte for byte.
    pub fn remove_if_same(&mut self, key: &Data, expected: &Data) -> bool {
        match self.live(key) {
            Some(record) if record.value() == expected => {
                self.records.remove(key);
                self.publish(EntryEventType::Removed, key.clone(), Some(expected.clone()), None);
                true
            }
            _ => false,
        }
    }

    /// Evicts a key. Publishes `Evicted` rather than `Removed`.
    pub fn evict(&mut self, key: &Data) -> bool {
        if self.live(key).is_none() {
            return false;
        }
        match self.records.remove(key) {
            Some(record) => {
                self.publish(EntryEventType::Evicted, key.clone(), Some(record.value().clone()), None);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the key has a live value.
    pub fn contains_key(&mut self, key: &Data) -> bool {
        self.live(key).is_some()
    }

    /// Applies `f` to the current value and stores its verdict atomically.
    ///
    /// Publishes the event matching the change, if any.
    pub fn compute<R>(&mut self, key: Data, f: impl FnOnce(Option<&Data>) -> (EntryUpdate, R)) -> R {
        let current = self.live(&key).map(|record| record.value().clone());
        let (update, result) = f(current.as_ref());
        match (update, current) {
            (EntryUpdate::Keep, _) | (EntryUpdate::Remove, None) => {}
            (EntryUpdate::Set(value), Some(_)) => {
                self.replace(key, value);
            }
            (EntryUpdate::Set(value), None) => {
                self.write(key, value, Ttl::MapDefault, false);
            }
            (EntryUpdate::Remove, Some(_)) => {
                self.remove(&key);
            }
        }
        result
    }

    /// Purges every expired record. Returns how many were purged.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<Data> = self
            .records
            .iter()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            if let Some(record) = self.records.remove(key) {
                self.publish(EntryEventType::Expired, key.clone(), Some(record.value().clone()), None);
            }
        }
        expired.len()
    }

    /// Drops every record not kept by `keep`, without per-key events.
    /// Returns how many live records were dropped.
    pub(crate) fn drain_live(&mut self, keep: impl Fn(&Data) -> bool) -> usize {
        self.purge_expired();
        let before = self.records.len();
        self.records.retain(|key, _| keep(key));
        before - self.records.len()
    }

    /// Visits every live record.
    pub fn for_each_live(&self, mut f: impl FnMut(&Data, &Record)) {
        let now = Instant::now();
        for (key, record) in self.records.iter() {
            if !record.is_expired(now) {
                f(key, record);
            }
        }
    }

    /// Returns the number of live records.
    pub fn live_count(&self) -> usize {
        let now = Instant::now();
        self.records.values().filter(|r| !r.is_expired(now)).count()
    }
}

impl std::fmt::Debug for LockedPartition<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedPartition")
            .field("id", &self.id)
            .field("records", &self.records.len())
            .finish()
    }
}
