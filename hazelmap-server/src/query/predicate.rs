//! Entry predicates and built-in combinators.

use std::fmt::{self, Debug};
use std::sync::Arc;

use hazelmap_core::Data;

/// A filter over map entries.
///
/// Evaluation works on the stored payloads; interpreting attributes inside a
/// value is up to the implementation.
pub trait Predicate: Debug + Send + Sync {
    /// Returns `true` if the entry matches.
    fn evaluate(&self, key: &Data, value: &Data) -> bool;
}

impl<P: Predicate + ?Sized> Predicate for Arc<P> {
    fn evaluate(&self, key: &Data, value: &Data) -> bool {
        (**self).evaluate(key, value)
    }
}

impl<P: Predicate + ?Sized> Predicate for Box<P> {
    fn evaluate(&self, key: &Data, value: &Data) -> bool {
        (**self).evaluate(key, value)
    }
}

/// Shared, type-erased predicate.
pub type BoxedPredicate = Arc<dyn Predicate>;

/// A predicate that always evaluates to true.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePredicate;

impl TruePredicate {
    /// Creates a new true predicate.
    pub fn new() -> Self {
        Self
    }
}

impl Predicate for TruePredicate {
    fn evaluate(&self, _key: &Data, _value: &Data) -> bool {
        true
    }
}

/// A predicate that always evaluates to false.
#[derive(Debug, Clone, Copy, Default)]
pub struct FalsePredicate;

impl FalsePredicate {
    /// Creates a new false predicate.
    pub fn new() -> Self {
        Self
    }
}

impl Predicate for FalsePredicate {
    fn evaluate(&self, _key: &Data, _value: &Data) -> bool {
        false
    }
}

/// Matches the entry whose key equals the given bytes.
#[derive(Debug, Clone)]
pub struct KeyEqualsPredicate {
    key: Data,
}

impl KeyEqualsPredicate {
    /// Creates a key equality predicate.
    pub fn new(key: impl Into<Data>) -> Self {
        Self { key: key.into() }
    }
}

impl Predicate for KeyEqualsPredicate {
    fn evaluate(&self, key: &Data, _value: &Data) -> bool {
        *key == self.key
    }
}

/// Matches entries whose value equals the given bytes.
#[derive(Debug, Clone)]
pub struct ValueEqualsPredicate {
    value: Data,
}

impl ValueEqualsPredicate {
    /// Creates a value equality predicate.
    pub fn new(value: impl Into<Data>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Predicate for ValueEqualsPredicate {
    fn evaluate(&self, _key: &Data, value: &Data) -> bool {
        *value == self.value
    }
}

/// Logical AND of several predicates. Empty means true.
#[derive(Debug, Clone)]
pub struct AndPredicate {
    predicates: Vec<BoxedPredicate>,
}

impl AndPredicate {
    /// Creates an AND predicate.
    pub fn new(predicates: Vec<BoxedPredicate>) -> Self {
        Self { predicates }
    }
}

impl Predicate for AndPredicate {
    fn evaluate(&self, key: &Data, value: &Data) -> bool {
        self.predicates.iter().all(|p| p.evaluate(key, value))
    }
}

/// Logical OR of several predicates. Empty means false.
#[derive(Debug, Clone)]
pub struct OrPredicate {
    predicates: Vec<BoxedPredicate>,
}

impl OrPredicate {
    /// Creates an OR predicate.
    pub fn new(predicates: Vec<BoxedPredicate>) -> Self {
        Self { predicates }
    }
}

impl Predicate for OrPredicate {
    fn evaluate(&self, key: &Data, value: &Data) -> bool {
        self.predicates.iter().any(|p| p.evaluate(key, value))
    }
}

/// Logical negation of a predicate.
#[derive(Debug, Clone)]
pub struct NotPredicate {
    predicate: BoxedPredicate,
}

impl NotPredicate {
    /// Creates a NOT predicate.
    pub fn new(predicate: BoxedPredicate) -> Self {
        Self { predicate }
    }
}

impl Predicate for NotPredicate {
    fn evaluate(&self, key: &Data, value: &Data) -> bool {
        !self.predicate.evaluate(key, value)
    }
}

/// A predicate backed by a closure.
pub struct FnPredicate<F> {
    f: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&Data, &Data) -> bool + Send + Sync,
{
    /// Wraps a closure taking the key and value.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&Data, &Data) -> bool + Send + Sync,
{
    fn evaluate(&self, key: &Data, value: &Data) -> bool {
        (self.f)(key, value)
    }
}

impl<F> Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate").finish_non_exhaustive()
    }
}

/// Factory for the built-in predicates.
pub struct Predicates;

impl Predicates {
    /// Returns a predicate that always evaluates to true.
    pub fn always_true() -> TruePredicate {
        TruePredicate::new()
    }

    /// Returns a predicate that always evaluates to false.
    pub fn always_false() -> FalsePredicate {
        FalsePredicate::new()
    }

    /// Returns a predicate matching a single key.
    pub fn key_equals(key: impl Into<Data>) -> KeyEqualsPredicate {
        KeyEqualsPredicate::new(key)
    }

    /// Returns a predicate matching a value.
    pub fn value_equals(value: impl Into<Data>) -> ValueEqualsPredicate {
        ValueEqualsPredicate::new(value)
    }

    /// Combines predicates with logical AND.
    pub fn and(predicates: Vec<BoxedPredicate>) -> AndPredicate {
        AndPredicate::new(predicates)
    }

    /// Combines predicates with logical OR.
    pub fn or(predicates: Vec<BoxedPredicate>) -> OrPredicate {
        OrPredicate::new(predicates)
    }

    /// Negates a predicate.
    pub fn not(predicate: BoxedPredicate) -> NotPredicate {
        NotPredicate::new(predicate)
    }

    /// Wraps a closure.
    pub fn from_fn<F>(f: F) -> FnPredicate<F>
    where
        F: Fn(&Data, &Data) -> bool + Send + Sync,
    {
        FnPredicate::new(f)
    }
}
