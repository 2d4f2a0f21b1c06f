//! Memory Hierarchy - Capacity tree, allocator and ledger
//!
//! Implements the simulated memory model with:
//! - A Ram → Arena → Pool → Block tree of capacity nodes
//! - Content-addressed objects with deduplication
//! - First-fit allocation with on-demand growth and fragmentation
//! - Reclamation, garbage collection and integrity auditing
//!
//! Every operation here is a plain function over a [`StoreTransaction`];
//! [`crate::MemoryManager`] owns the transaction boundaries.
//!
//! [`StoreTransaction`]: crate::store::StoreTransaction

pub mod allocator;
pub mod capacity;
pub mod hierarchy;
pub mod identity;
pub mod ledger;
pub mod nodes;
pub mod reclaimer;
pub mod stats;

pub use allocator::{allocate, Allocation};
pub use capacity::{CapacityNode, Usage};
pub use hierarchy::BlockPath;
pub use identity::{Object, ObjectId};
pub use ledger::{LedgerEntry, StoredObject};
pub use nodes::{ArenaNode, BlockNode, Container, PoolNode, RamNode};
pub use reclaimer::{free, garbage_collect, GcReport, Release};
pub use stats::{MemoryStats, verify_integrity};
