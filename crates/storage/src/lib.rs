//! Sharded, branch-partitioned storage backing the plain KV keyspace.

pub mod sharded;

pub use sharded::{Shard, ShardedStore};
