//! Collects the method names a server exposes.
//!
//! Handlers register their fully-qualified method name at construction; a
//! reflection service later reads the accumulated list. The set is
//! append-only and keeps insertion order. Once the server starts handling
//! traffic no new handlers should be constructed, so readers can treat the
//! contents as frozen.

use std::sync::{Arc, Mutex};

/// Thread-safe, insertion-ordered accumulator of method full names.
///
/// Cloning is cheap; clones share the underlying set.
#[derive(Clone, Debug, Default)]
pub struct Registrar {
    methods: Arc<Mutex<Vec<String>>>,
}

impl Registrar {
    /// Create an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a method. Duplicates are ignored.
    pub(crate) fn register(&self, method_fqn: &str) {
        let mut methods = self
            .methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !methods.iter().any(|m| m == method_fqn) {
            methods.push(method_fqn.to_owned());
        }
    }

    /// Snapshot the registered method names in registration order.
    pub fn methods(&self) -> Vec<String> {
        self.methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether anything has been registered.
    pub fn is_empty(&self) -> bool {
        self.methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
