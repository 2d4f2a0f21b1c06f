//! `TierMem` Core Prelude
//!
//! Common imports for driving the allocator.

pub use crate::config::{AllocatorConfig, TierConfig};
pub use crate::error::{AllocatorError, AllocatorResult, StoreError, StoreResult};
pub use crate::manager::MemoryManager;
pub use crate::memory::{
    Allocation, CapacityNode, GcReport, LedgerEntry, MemoryStats, Object, ObjectId, StoredObject,
};
pub use crate::store::{MemoryStore, Store, StoreTransaction};
pub use crate::types::{ArenaId, BlockId, NodeRef, PoolId};

pub use garde::Validate;

/// Common result type alias
pub type Result<T> = AllocatorResult<T>;
