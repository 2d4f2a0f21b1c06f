//! `TierMem` Data Storage - Persistent Store for the Allocation Hierarchy
//!
//! This crate persists the `TierMem` hierarchy, stored objects and allocation
//! ledger in an embedded redb database, so a manager can be reopened with its
//! state intact.
#![allow(clippy::significant_drop_tightening)] // Table handles live for the whole helper body
#![allow(clippy::missing_const_for_fn)]
//!
//! # Features
//!
//! - **Transactional**: one redb write transaction per allocator operation
//! - **Durable**: file-backed databases survive restarts
//! - **In-memory mode**: same code path for tests and ephemeral use
//! - **Observable**: per-transaction timing kept in a bounded metrics ring
//!
//! # Quick Start
//!
//! ```rust
//! use tiermem_core::{AllocatorConfig, Object};
//! use tiermem_data_storage::{open_manager, RedbStoreConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = open_manager(&RedbStoreConfig::in_memory(), AllocatorConfig::test()?)?;
//!
//!     let id = manager.allocate(&Object::from_bytes(b"persisted".to_vec()))?;
//!     assert!(manager.is_stored(&id)?);
//!     Ok(())
//! }
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    missing_docs
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use tiermem_core::{AllocatorConfig, MemoryManager};

// Public exports
pub use config::*;
pub use error::*;
pub use types::*;

// Internal modules
pub mod config;
pub mod error;
pub mod types;

// Storage modules
pub mod storage;

// Re-exports for convenience
pub use storage::{RedbStore, RedbTransaction};

/// Open a redb store and attach a memory manager to it
///
/// A store that already holds a hierarchy resumes it; the configured Ram
/// capacity must match the persisted one.
///
/// # Errors
///
/// Returns error if the database cannot be opened, the configuration is
/// invalid, or the persisted Ram capacity differs from the configured one.
pub fn open_manager(
    store_config: &RedbStoreConfig,
    allocator_config: AllocatorConfig,
) -> DataStorageResult<MemoryManager<RedbStore>> {
    let store = RedbStore::open(store_config)?;
    Ok(MemoryManager::new(store, allocator_config)?)
}
