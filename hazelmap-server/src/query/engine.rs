//! Predicate queries over the entry store.

use std::sync::Arc;

use hazelmap_core::{Data, HazelmapError, Result};

use super::predicate::{BoxedPredicate, Predicate};
use crate::store::EntryStore;

/// Which part of each matching entry a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IterationType {
    /// Keys only.
    Key = 0,
    /// Values only.
    Value = 1,
    /// Key-value pairs.
    #[default]
    Entry = 2,
}

/// Rows produced by a query. Row order is unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// Matching keys.
    Keys(Vec<Data>),
    /// Values of matching entries, one per key.
    Values(Vec<Data>),
    /// Matching entries.
    Entries(Vec<(Data, Data)>),
}

impl QueryResult {
    fn empty(iteration: IterationType) -> Self {
        match iteration {
            IterationType::Key => QueryResult::Keys(Vec::new()),
            IterationType::Value => QueryResult::Values(Vec::new()),
            IterationType::Entry => QueryResult::Entries(Vec::new()),
        }
    }

    fn push(&mut self, key: &Data, value: &Data) {
        match self {
            QueryResult::Keys(keys) => keys.push(key.clone()),
            QueryResult::Values(values) => values.push(value.clone()),
            QueryResult::Entries(entries) => entries.push((key.clone(), value.clone())),
        }
    }

    /// Returns the iteration type that produced this result.
    pub fn iteration_type(&self) -> IterationType {
        match self {
            QueryResult::Keys(_) => IterationType::Key,
            QueryResult::Values(_) => IterationType::Value,
            QueryResult::Entries(_) => IterationType::Entry,
        }
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Keys(rows) | QueryResult::Values(rows) => rows.len(),
            QueryResult::Entries(rows) => rows.len(),
        }
    }

    /// Returns `true` if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves predicates sent over the wire.
///
/// The payload format is owned by the client library; the member only needs
/// to turn it into something it can evaluate.
pub trait PredicateDecoder: Send + Sync {
    /// Decodes a serialized predicate.
    fn decode(&self, data: &Data) -> Result<BoxedPredicate>;
}

impl<F> PredicateDecoder for F
where
    F: Fn(&Data) -> Result<BoxedPredicate> + Send + Sync,
{
    fn decode(&self, data: &Data) -> Result<BoxedPredicate> {
        self(data)
    }
}

/// A decoder that rejects every serialized predicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPredicateDecoder;

impl PredicateDecoder for NoPredicateDecoder {
    fn decode(&self, _data: &Data) -> Result<BoxedPredicate> {
        Err(HazelmapError::Unsupported(
            "no predicate decoder is configured".to_string(),
        ))
    }
}

/// Runs predicate queries against one map.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<EntryStore>,
}

impl QueryEngine {
    /// Creates a query engine over the given store.
    pub fn new(store: Arc<EntryStore>) -> Self {
        Self { store }
    }

    /// Returns every live entry matching `predicate`.
    ///
    /// `None` matches everything. With `local_only` only owned partitions are
    /// scanned. Expired entries are never returned.
    pub fn query(&self, predicate: Option<&dyn Predicate>, iteration: IterationType, local_only: bool) -> QueryResult {
        let mut result = QueryResult::empty(iteration);
        self.store.scan(local_only, |key, record| {
            let value = record.value();
            if predicate.map_or(true, |p| p.evaluate(key, value)) {
                result.push(key, value);
            }
        });
        tracing::trace!(
            map = %self.store.name(),
            iteration = ?iteration,
            local_only,
            rows = result.len(),
            "query finished"
        );
        result
    }
}
