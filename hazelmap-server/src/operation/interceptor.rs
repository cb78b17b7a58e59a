//! Map interceptors that rewrite values on their way in and out of the store.

use std::sync::{Arc, RwLock};

use hazelmap_core::Data;
use uuid::Uuid;

/// Intercepts map operations on this member.
///
/// Interceptors run inside the operation, under the partition lock of the
/// key, and see values exactly as they are stored. They must not call back
/// into the same map.
///
/// # Example
///
/// ```ignore
/// use hazelmap_core::Data;
/// use hazelmap_server::operation::MapInterceptor;
///
/// struct UpperCase;
///
/// impl MapInterceptor for UpperCase {
///     fn intercept_put(&self, _old: Option<&Data>, new_value: Data) -> Data {
///         Data::from(new_value.as_bytes().to_ascii_uppercase())
///     }
/// }
/// ```
pub trait MapInterceptor: Send + Sync {
    /// Rewrites a value read from the map before it reaches the caller.
    fn intercept_get(&self, value: Option<Data>) -> Option<Data> {
        value
    }

    /// Rewrites a value before it is stored.
    ///
    /// `old_value` is the value currently stored, if any.
    fn intercept_put(&self, old_value: Option<&Data>, new_value: Data) -> Data {
        let _ = old_value;
        new_value
    }

    /// Observes a removal. `removed` is `None` if the key had no value.
    fn intercept_remove(&self, removed: Option<&Data>) {
        let _ = removed;
    }
}

/// Registered interceptors, applied in registration order.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: RwLock<Vec<(String, Arc<dyn MapInterceptor>)>>,
}

impl InterceptorChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<(String, Arc<dyn MapInterceptor>)>> {
        self.interceptors
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Appends an interceptor and returns its registration id.
    pub fn add(&self, interceptor: Arc<dyn MapInterceptor>) -> String {
        let id = format!("interceptor-{}", Uuid::new_v4());
        self.interceptors
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((id.clone(), interceptor));
        id
    }

    /// Removes an interceptor. Returns `false` for unknown ids.
    pub fn remove(&self, id: &str) -> bool {
        let mut interceptors = self
            .interceptors
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = interceptors.len();
        interceptors.retain(|(registered, _)| registered != id);
        interceptors.len() != before
    }

    /// Returns the number of registered interceptors.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no interceptor is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn on_get(&self, value: Option<Data>) -> Option<Data> {
        self.read()
            .iter()
            .fold(value, |value, (_, interceptor)| interceptor.intercept_get(value))
    }

    pub(crate) fn on_put(&self, old_value: Option<&Data>, new_value: Data) -> Data {
        self.read()
            .iter()
            .fold(new_value, |value, (_, interceptor)| interceptor.intercept_put(old_value, value))
    }

    pub(crate) fn on_remove(&self, removed: Option<&Data>) {
        for (_, interceptor) in self.read().iter() {
            interceptor.intercept_remove(removed);
        }
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self.read().iter().map(|(id, _)| id.clone()).collect();
        f.debug_struct("InterceptorChain").field("interceptors", &ids).finish()
    }
}
