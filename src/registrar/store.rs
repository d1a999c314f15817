//! Persistence of handler specs.
//!
//! The trait is the contract an external durable store implements. The
//! in-memory backend is used for embedded setups and tests.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StorageError;
use crate::handler::HandlerSpec;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Storage trait for handler specs.
///
/// All mutations should be atomic; implementations must handle concurrent
/// access safely.
pub trait HandlerSpecStore: Send + Sync {
    /// Insert a new spec. Returns `DuplicateKey` if the id already exists.
    fn create(&self, spec: HandlerSpec) -> Result<(), StorageError>;

    /// Get a spec by id.
    fn get(&self, id: &str) -> Result<Option<HandlerSpec>, StorageError>;

    /// Replace the spec stored under `old_id` with `spec`.
    ///
    /// Returns `KeyNotFound` if `old_id` does not exist, and `DuplicateKey` if
    /// `spec.id` differs from `old_id` and is already taken.
    fn replace(&self, old_id: &str, spec: HandlerSpec) -> Result<(), StorageError>;

    /// Delete a spec. Returns `KeyNotFound` if it does not exist.
    fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Every stored spec, in id order.
    fn list(&self) -> Result<Vec<HandlerSpec>, StorageError>;
}

/// Thread-safe in-memory spec store.
#[derive(Debug, Default)]
pub struct InMemoryHandlerSpecStore {
    specs: RwLock<BTreeMap<String, HandlerSpec>>,
}

impl InMemoryHandlerSpecStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HandlerSpecStore for InMemoryHandlerSpecStore {
    fn create(&self, spec: HandlerSpec) -> Result<(), StorageError> {
        let mut specs = self.specs.write().map_err(|_| lock_err("spec.create"))?;
        if specs.contains_key(&spec.id) {
            return Err(StorageError::DuplicateKey(spec.id));
        }
        specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<HandlerSpec>, StorageError> {
        let specs = self.specs.read().map_err(|_| lock_err("spec.get"))?;
        Ok(specs.get(id).cloned())
    }

    fn replace(&self, old_id: &str, spec: HandlerSpec) -> Result<(), StorageError> {
        let mut specs = self.specs.write().map_err(|_| lock_err("spec.replace"))?;
        if !specs.contains_key(old_id) {
            return Err(StorageError::KeyNotFound(old_id.to_string()));
        }
        if spec.id != old_id && specs.contains_key(&spec.id) {
            return Err(StorageError::DuplicateKey(spec.id));
        }
        specs.remove(old_id);
        specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut specs = self.specs.write().map_err(|_| lock_err("spec.delete"))?;
        specs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::KeyNotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<HandlerSpec>, StorageError> {
        let specs = self.specs.read().map_err(|_| lock_err("spec.list"))?;
        Ok(specs.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerKind;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_spec_store_object_safe(_: &dyn HandlerSpecStore) {}

    fn spec(id: &str) -> HandlerSpec {
        HandlerSpec::new(id, ["disk"], HandlerKind::Log { prefix: String::new() })
    }

    #[test]
    fn spec_store_create_get_delete() {
        let store = InMemoryHandlerSpecStore::new();
        store.create(spec("h1")).unwrap();
        assert!(matches!(store.create(spec("h1")), Err(StorageError::DuplicateKey(_))));
        assert_eq!(store.get("h1").unwrap().unwrap().id, "h1");
        assert!(store.get("h2").unwrap().is_none());

        store.delete("h1").unwrap();
        assert!(matches!(store.delete("h1"), Err(StorageError::KeyNotFound(_))));
    }

    #[test]
    fn spec_store_replace_and_rename() {
        let store = InMemoryHandlerSpecStore::new();
        store.create(spec("a")).unwrap();
        store.create(spec("b")).unwrap();

        assert!(matches!(store.replace("zz", spec("zz")), Err(StorageError::KeyNotFound(_))));
        assert!(matches!(store.replace("a", spec("b")), Err(StorageError::DuplicateKey(_))));

        store.replace("a", spec("c")).unwrap();
        let ids: Vec<_> = store.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }
}
