//! `TierMem` Core - Tiered Memory Allocator with Allocation Ledger
//!
//! This crate simulates a memory hierarchy (Ram → Arena → Pool → Block) on
//! top of a transactional store, placing content-addressed objects with a
//! first-fit policy and recording every placed fragment in a ledger.
//!
//! # Features
//!
//! - **Deduplication**: identical content is stored once, keyed by SHA-256
//! - **First-fit reuse**: partially used blocks are filled before growing
//! - **On-demand growth**: blocks, pools and arenas are created as needed
//! - **Fragmentation**: objects larger than a block span several blocks
//! - **Atomic operations**: every public call commits or rolls back as a unit
//! - **Zero-panic policy**: all operations return `Result<T, E>`
//!
//! # Architecture
//!
//! - [`memory`] - capacity nodes, allocation, reclamation, statistics
//! - [`store`] - transactional store contract and the in-memory store
//! - [`manager`] - [`MemoryManager`], the transactional facade
//! - [`config`] - tier sizing with validation and file/env loading
//! - [`types`] - typed identifiers shared by every module
//!
//! # Example
//!
//! ```rust
//! use tiermem_core::{AllocatorConfig, AllocatorResult, MemoryManager, Object};
//!
//! fn main() -> AllocatorResult<()> {
//!     let manager = MemoryManager::in_memory(AllocatorConfig::test()?)?;
//!
//!     let object = Object::from_bytes(b"Test Object 1".to_vec());
//!     let id = manager.allocate(&object)?;
//!     assert_eq!(manager.allocate(&object)?, id);
//!
//!     manager.free(&id)?;
//!     manager.garbage_collect()?;
//!     assert_eq!(manager.stats()?.block_count, 0);
//!     Ok(())
//! }
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::large_stack_arrays,
    clippy::indexing_slicing,
    missing_docs
)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::correctness,
    clippy::suspicious,
    clippy::perf,
    clippy::style,
    clippy::complexity,
    clippy::unreachable,
    clippy::redundant_pattern_matching,
    clippy::manual_let_else,
    clippy::needless_pass_by_ref_mut,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::float_cmp
)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Public modules
pub mod config;
pub mod error;
pub mod prelude;
pub mod types;

// Core functionality modules
pub mod manager;
pub mod memory;
pub mod store;
pub mod telemetry;

// Re-exports for convenience
pub use config::{AllocatorConfig, TierConfig};
pub use error::{AllocatorError, AllocatorResult, ErrorCode, StoreError, StoreResult};
pub use manager::MemoryManager;
pub use memory::{
    Allocation, ArenaNode, BlockNode, CapacityNode, Container, GcReport, LedgerEntry, MemoryStats,
    Object, ObjectId, PoolNode, RamNode, Release, StoredObject, Usage,
};
pub use store::{MemoryStore, Store, StoreTransaction};
pub use types::{ArenaId, BlockId, EntityKind, LedgerEntryId, NodeRef, PoolId};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
