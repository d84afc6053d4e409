//! Sharded, branch-partitioned storage for the keyspace.
//!
//! Replaces a single RwLock + BTreeMap with DashMap + HashMap: lock-free
//! reads, sharded writes, O(1) lookups.
//!
//! # Design
//!
//! - DashMap: sharded by `BranchId`, lock-free reads
//! - FxHashMap: O(1) lookups, fast non-crypto hash
//! - Per-branch shard: natural partitioning, no cross-branch contention
//!
//! # Performance Targets
//!
//! - get(): Lock-free via DashMap
//! - put(): Only locks target shard
//! - Different branches: never contend

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::{BranchId, Key, Versioned};

/// Per-branch shard containing that branch's data.
///
/// Each `BranchId` gets its own shard with an `FxHashMap` for O(1)
/// lookups, so different branches never contend with each other.
#[derive(Debug)]
pub struct Shard {
    pub(crate) data: FxHashMap<Key, Versioned<strata_core::Value>>,
}

impl Shard {
    /// Create a new empty shard.
    pub fn new() -> Self {
        Self {
            data: FxHashMap::default(),
        }
    }

    /// Create a shard with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Number of entries in this shard.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if this shard holds no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Shard {
    fn default() -> Self {
        Self::new()
    }
}

/// Sharded storage for plain KV entries — DashMap by `BranchId`,
/// `FxHashMap` within.
///
/// Tensor/Model/Script objects are not stored here: they carry
/// reference-counted, backend-visible state the byte-oriented `Value`
/// isn't shaped for, so `strata-engine` keeps a dedicated object store
/// for them (see DESIGN.md) built on the same per-branch sharding idiom.
///
/// # Thread Safety
///
/// - `get()`: lock-free read via DashMap
/// - `put()`: only locks the target branch's shard
/// - different branches never contend
///
/// ```ignore
/// use strata_storage::ShardedStore;
/// use std::sync::Arc;
///
/// let store = Arc::new(ShardedStore::new());
/// assert_eq!(store.shard_count(), 0);
/// ```
pub struct ShardedStore {
    shards: DashMap<BranchId, Shard>,
    version: AtomicU64,
}

impl ShardedStore {
    /// Create a new, empty sharded store.
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Create a store pre-sized for an expected number of branches.
    pub fn with_capacity(num_branches: usize) -> Self {
        Self {
            shards: DashMap::with_capacity(num_branches),
            version: AtomicU64::new(0),
        }
    }

    /// Current global version counter.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Increment the global version counter and return the new value.
    #[inline]
    pub fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Set the global version counter (used during recovery).
    pub fn set_version(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }

    /// Number of branch shards currently allocated.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// True if a shard exists for `branch_id`.
    pub fn has_branch(&self, branch_id: &BranchId) -> bool {
        self.shards.contains_key(branch_id)
    }

    /// Total number of entries across all shards.
    pub fn total_entries(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }

    /// Get a value by key. Lock-free; only the key's branch shard is
    /// touched.
    #[inline]
    pub fn get(&self, key: &Key) -> Option<Versioned<strata_core::Value>> {
        self.shards
            .get(&key.branch_id)
            .and_then(|shard| shard.data.get(key).cloned())
    }

    /// Put a value for a key. Only locks the key's branch shard.
    #[inline]
    pub fn put(&self, key: Key, value: Versioned<strata_core::Value>) {
        self.shards
            .entry(key.branch_id)
            .or_insert_with(Shard::new)
            .data
            .insert(key, value);
    }

    /// Delete a key, returning the removed value if it existed.
    #[inline]
    pub fn delete(&self, key: &Key) -> Option<Versioned<strata_core::Value>> {
        self.shards
            .get_mut(&key.branch_id)
            .and_then(|mut shard| shard.data.remove(key))
    }

    /// True if `key` currently has a value.
    #[inline]
    pub fn contains(&self, key: &Key) -> bool {
        self.shards
            .get(&key.branch_id)
            .map(|shard| shard.data.contains_key(key))
            .unwrap_or(false)
    }

    /// Apply a batch of writes and deletes, stamping every write with
    /// `version` and the current time.
    pub fn apply_batch(
        &self,
        writes: &[(Key, strata_core::Value)],
        deletes: &[Key],
        version: u64,
    ) {
        for (key, value) in writes {
            let versioned = Versioned {
                value: value.clone(),
                version: strata_core::Version::Sequence(version),
                timestamp: strata_core::Timestamp::now(),
            };
            self.put(key.clone(), versioned);
        }
        for key in deletes {
            self.delete(key);
        }
    }

    /// Number of entries stored for a specific branch.
    pub fn branch_entry_count(&self, branch_id: &BranchId) -> usize {
        self.shards
            .get(branch_id)
            .map(|shard| shard.len())
            .unwrap_or(0)
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("shard_count", &self.shard_count())
            .field("version", &self.version())
            .field("total_entries", &self.total_entries())
            .finish()
    }
}
