//! Predicate-based queries over map entries.
//!
//! Predicates are evaluated on the member against stored payloads. Wire
//! predicates are turned into [`Predicate`]s by a [`PredicateDecoder`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hazelmap_server::query::*;
//!
//! let pred = Predicates::or(vec![
//!     Arc::new(Predicates::key_equals("a")),
//!     Arc::new(Predicates::value_equals("42")),
//! ]);
//! let result = engine.query(Some(&pred), IterationType::Key, false);
//! ```

mod engine;
mod predicate;

pub use engine::{IterationType, NoPredicateDecoder, PredicateDecoder, QueryEngine, QueryResult};
pub use predicate::{
    AndPredicate, BoxedPredicate, FalsePredicate, FnPredicate, KeyEqualsPredicate, NotPredicate,
    OrPredicate, Predicate, Predicates, TruePredicate, ValueEqualsPredicate,
};
