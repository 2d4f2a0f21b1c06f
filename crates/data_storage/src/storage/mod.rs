//! Storage implementations
//!
//! Persistent backends for the core's transactional store contract.

pub mod redb_store;

pub use redb_store::{RedbStore, RedbTransaction};
