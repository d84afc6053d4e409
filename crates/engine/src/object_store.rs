//! Per-branch keyspace storage for Tensor/Model/Script objects (spec.md
//! §6 "Object keys in the keyspace").
//!
//! `strata_storage::ShardedStore` only holds the byte-oriented `Value`
//! primitive; tensors/models/scripts carry reference-counted,
//! backend-visible state it isn't shaped for (see that crate's own doc
//! comment). This store follows the same per-branch sharding idiom —
//! `DashMap<BranchId, Mutex<FxHashMap<...>>>` — specialized to whichever
//! refcounted object type `T` this instance holds.

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use strata_core::BranchId;

/// A per-branch object store, generic over the refcounted object kind
/// (`Tensor`, `Model`, or `Script`).
pub struct ObjectStore<T: Clone> {
    branches: DashMap<BranchId, Mutex<FxHashMap<String, T>>>,
}

impl<T: Clone> ObjectStore<T> {
    /// An empty store.
    pub fn new() -> Self {
        ObjectStore {
            branches: DashMap::new(),
        }
    }

    /// Fetch a shallow copy of the object at `name` on `branch`, if any.
    pub fn get(&self, branch: BranchId, name: &str) -> Option<T> {
        self.branches
            .get(&branch)
            .and_then(|shard| shard.lock().get(name).cloned())
    }

    /// True if `name` exists on `branch`.
    pub fn contains(&self, branch: BranchId, name: &str) -> bool {
        self.branches
            .get(&branch)
            .map(|shard| shard.lock().contains_key(name))
            .unwrap_or(false)
    }

    /// Store (or overwrite) the object at `name` on `branch`.
    pub fn put(&self, branch: BranchId, name: impl Into<String>, value: T) {
        self.branches
            .entry(branch)
            .or_insert_with(|| Mutex::new(FxHashMap::default()))
            .lock()
            .insert(name.into(), value);
    }

    /// Remove the object at `name` on `branch`, returning it if present.
    pub fn remove(&self, branch: BranchId, name: &str) -> Option<T> {
        self.branches
            .get(&branch)
            .and_then(|shard| shard.lock().remove(name))
    }

    /// Number of objects stored on `branch`.
    pub fn branch_len(&self, branch: BranchId) -> usize {
        self.branches
            .get(&branch)
            .map(|shard| shard.lock().len())
            .unwrap_or(0)
    }
}

impl<T: Clone> Default for ObjectStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove_roundtrip() {
        let store: ObjectStore<i32> = ObjectStore::new();
        let branch = BranchId::default_branch();
        assert!(store.get(branch, "a").is_none());
        store.put(branch, "a", 42);
        assert_eq!(store.get(branch, "a"), Some(42));
        assert!(store.contains(branch, "a"));
        assert_eq!(store.remove(branch, "a"), Some(42));
        assert!(store.get(branch, "a").is_none());
    }

    #[test]
    fn branches_are_independent() {
        let store: ObjectStore<i32> = ObjectStore::new();
        let b1 = BranchId::new();
        let b2 = BranchId::new();
        store.put(b1, "x", 1);
        assert!(store.get(b2, "x").is_none());
        assert_eq!(store.branch_len(b1), 1);
        assert_eq!(store.branch_len(b2), 0);
    }
}
