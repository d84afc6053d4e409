//! Durability policy for a database instance.

use serde::{Deserialize, Serialize};

/// How aggressively a write is made durable before the caller is
/// acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityMode {
    /// No fsync; data survives a clean process exit but not a crash.
    #[default]
    None,
    /// fsync after every write.
    Sync,
    /// fsync on a periodic background interval.
    Periodic,
}
