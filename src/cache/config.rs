use crate::{config, mshr};

use serde::{Deserialize, Serialize};

/// Cache write-allocate policy.
///
/// `WRITE_ALLOCATE` fetches the block into the cache on a write miss
/// before the write is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum WriteAllocatePolicy {
    NO_WRITE_ALLOCATE, // N
    WRITE_ALLOCATE,    // W
}

/// A cache write policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum WritePolicy {
    READ_ONLY,          // R
    WRITE_BACK,         // B
    WRITE_THROUGH,      // T
    WRITE_EVICT,        // E
    LOCAL_WB_GLOBAL_WT, // L
}

/// A cache allocate policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AllocatePolicy {
    ON_MISS, // M
    ON_FILL, // F
}

/// A cache replacement policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReplacementPolicy {
    LRU,  // L
    FIFO, // F
}

/// A cache set index function.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SetIndexFunction {
    #[default]
    LINEAR, // L
    FERMI_HASH, // H
}

/// Cache geometry and policies, derived once from a validated configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Cache allocate policy.
    pub allocate_policy: AllocatePolicy,

    /// Cache replacement policy.
    pub replacement_policy: ReplacementPolicy,

    /// Cache write allocate policy.
    pub write_allocate_policy: WriteAllocatePolicy,

    /// Cache write policy.
    pub write_policy: WritePolicy,

    /// Cache set index function.
    pub set_index_function: SetIndexFunction,

    /// Cache line size.
    pub line_size: u32,

    /// Cache associativity.
    pub associativity: usize,

    /// Number of sets.
    pub num_sets: usize,

    /// Size of a fetch to the next level.
    pub atom_size: u32,

    /// Cache miss queue size.
    pub miss_queue_size: usize,

    /// Miss status handling register kind.
    pub mshr_kind: mshr::Kind,

    /// Number of lines.
    pub total_lines: usize,
    pub line_size_log2: u32,
    pub num_sets_log2: u32,
}

impl From<&config::Cache> for Config {
    fn from(config: &config::Cache) -> Self {
        Self {
            write_policy: config.write_policy,
            write_allocate_policy: config.write_allocate_policy,
            allocate_policy: config.allocate_policy,
            replacement_policy: config.replacement_policy,
            set_index_function: config.set_index_function,
            associativity: config.associativity,
            num_sets: config.num_sets,
            atom_size: config.atom_size(),
            miss_queue_size: config.miss_queue_size,
            mshr_kind: config.mshr_kind,
            total_lines: config.total_lines(),
            line_size: config.line_size,
            line_size_log2: config.line_size_log2(),
            num_sets_log2: config.num_sets_log2(),
        }
    }
}
