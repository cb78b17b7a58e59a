//! Entry processors: atomic read-modify-write on a single entry.

use std::collections::HashMap;

use hazelmap_core::Data;

use crate::store::EntryUpdate;

/// A processor executed on a map entry on the owning member.
///
/// The processor runs under the partition lock of the key, so the read, the
/// decision, and the write are one atomic step. Changes made through
/// [`MapEntry::set_value`] or [`MapEntry::remove`] are applied after
/// `process` returns and publish the matching entry event.
pub trait EntryProcessor: Send + Sync {
    /// Processes the entry and returns an optional result for the caller.
    fn process(&self, entry: &mut MapEntry) -> Option<Data>;
}

impl<F> EntryProcessor for F
where
    F: Fn(&mut MapEntry) -> Option<Data> + Send + Sync,
{
    fn process(&self, entry: &mut MapEntry) -> Option<Data> {
        self(entry)
    }
}

/// The entry handed to an [`EntryProcessor`].
#[derive(Debug, Clone)]
pub struct MapEntry {
    key: Data,
    value: Option<Data>,
    update: EntryUpdate,
}

impl MapEntry {
    pub(crate) fn new(key: Data, value: Option<Data>) -> Self {
        Self {
            key,
            value,
            update: EntryUpdate::Keep,
        }
    }

    /// Returns the key.
    pub fn key(&self) -> &Data {
        &self.key
    }

    /// Returns the current value, reflecting earlier changes in this call.
    pub fn value(&self) -> Option<&Data> {
        self.value.as_ref()
    }

    /// Sets a new value for the entry.
    pub fn set_value(&mut self, value: Data) {
        self.value = Some(value.clone());
        self.update = EntryUpdate::Set(value);
    }

    /// Removes the entry.
    pub fn remove(&mut self) {
        self.value = None;
        self.update = EntryUpdate::Remove;
    }

    pub(crate) fn into_update(self) -> EntryUpdate {
        self.update
    }
}

/// Results of running a processor over several keys.
///
/// Keys whose processor returned `None` are not included.
#[derive(Debug, Clone, Default)]
pub struct EntryProcessorResult {
    results: HashMap<Data, Data>,
}

impl EntryProcessorResult {
    /// Creates a result set from a map of results.
    pub fn new(results: HashMap<Data, Data>) -> Self {
        Self { results }
    }

    /// Returns the result for a key.
    pub fn get(&self, key: &Data) -> Option<&Data> {
        self.results.get(key)
    }

    /// Returns the number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if there are no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Consumes the result set and returns the underlying map.
    pub fn into_inner(self) -> HashMap<Data, Data> {
        self.results
    }

    /// Iterates over `(key, result)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Data, &Data)> {
        self.results.iter()
    }
}

impl IntoIterator for EntryProcessorResult {
    type Item = (Data, Data);
    type IntoIter = std::collections::hash_map::IntoIter<Data, Data>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
