//! Storage collaborator contract
//!
//! The core never owns persistence. It drives a [`Store`] through scoped
//! [`StoreTransaction`] handles: one handle per public operation, committed on
//! success and rolled back on every failure path. Opening a handle excludes
//! every other writer, which is the serialization the first-fit scan and the
//! counter propagation need.
//!
//! Listing methods return records in ascending id order. Ids come from
//! per-kind sequences, so that order is creation order.

use crate::error::StoreResult;
use crate::memory::identity::ObjectId;
use crate::memory::ledger::{LedgerEntry, StoredObject};
use crate::memory::nodes::{ArenaNode, BlockNode, PoolNode, RamNode};
use crate::memory::{CapacityNode, Container};
use crate::types::{ArenaId, BlockId, EntityKind, PoolId};

pub mod memory_store;

pub use memory_store::{MemoryStore, MemoryTransaction};

/// A store that can hand out transaction handles
pub trait Store {
    /// Transaction handle type
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Open a transaction, blocking until no other handle is open
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot start a transaction.
    fn begin(&self) -> StoreResult<Self::Transaction<'_>>;
}

/// Scoped transaction handle over the entity tables
///
/// Reads observe the handle's own uncommitted writes.
pub trait StoreTransaction {
    /// Root Ram record, if the store was initialized
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn load_ram(&self) -> StoreResult<Option<RamNode>>;

    /// Write the Ram record
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_ram(&mut self, ram: &RamNode) -> StoreResult<()>;

    /// Next value of a per-kind id sequence (starts at 1, never reused)
    ///
    /// # Errors
    ///
    /// Returns error if the sequence cannot be advanced.
    fn next_id(&mut self, kind: EntityKind) -> StoreResult<u64>;

    /// All arenas, ascending id
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn arenas(&self) -> StoreResult<Vec<ArenaNode>>;

    /// One arena
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn arena(&self, id: ArenaId) -> StoreResult<Option<ArenaNode>>;

    /// Insert or update an arena
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_arena(&mut self, arena: &ArenaNode) -> StoreResult<()>;

    /// Delete an arena
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn delete_arena(&mut self, id: ArenaId) -> StoreResult<()>;

    /// All pools, ascending id
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn pools(&self) -> StoreResult<Vec<PoolNode>>;

    /// One pool
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn pool(&self, id: PoolId) -> StoreResult<Option<PoolNode>>;

    /// Insert or update a pool
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_pool(&mut self, pool: &PoolNode) -> StoreResult<()>;

    /// Delete a pool
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn delete_pool(&mut self, id: PoolId) -> StoreResult<()>;

    /// All blocks, ascending id
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn blocks(&self) -> StoreResult<Vec<BlockNode>>;

    /// One block
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn block(&self, id: BlockId) -> StoreResult<Option<BlockNode>>;

    /// Insert or update a block
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_block(&mut self, block: &BlockNode) -> StoreResult<()>;

    /// Delete a block
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn delete_block(&mut self, id: BlockId) -> StoreResult<()>;

    /// Stored object by id
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn object(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Insert or update a stored object
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_object(&mut self, object: &StoredObject) -> StoreResult<()>;

    /// Delete a stored object
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn delete_object(&mut self, id: &ObjectId) -> StoreResult<()>;

    /// Number of stored objects
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn object_count(&self) -> StoreResult<u64>;

    /// Every ledger entry, ascending id
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn ledger(&self) -> StoreResult<Vec<LedgerEntry>>;

    /// Insert a ledger entry
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_ledger_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()>;

    /// Delete every ledger entry of an object, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn delete_ledger_of(&mut self, id: &ObjectId) -> StoreResult<usize>;

    /// Ledger entries of one object, ascending id
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn ledger_of(&self, id: &ObjectId) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .ledger()?
            .into_iter()
            .filter(|entry| &entry.object_id == id)
            .collect())
    }

    /// Pools owned by an arena, ascending id
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn pools_in(&self, arena_id: ArenaId) -> StoreResult<Vec<PoolNode>> {
        Ok(self
            .pools()?
            .into_iter()
            .filter(|pool| pool.arena_id == arena_id)
            .collect())
    }

    /// Blocks owned by a pool, ascending id
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn blocks_in(&self, pool_id: PoolId) -> StoreResult<Vec<BlockNode>> {
        Ok(self
            .blocks()?
            .into_iter()
            .filter(|block| block.pool_id == pool_id)
            .collect())
    }

    /// First block in creation order with `remaining() > 0`
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn first_block_with_room(&self) -> StoreResult<Option<BlockNode>> {
        Ok(self
            .blocks()?
            .into_iter()
            .find(|block| block.remaining() > 0))
    }

    /// First pool in creation order that can take another block
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn first_pool_with_room(&self) -> StoreResult<Option<PoolNode>> {
        Ok(self.pools()?.into_iter().find(|pool| pool.room() > 0))
    }

    /// First arena in creation order that can take another pool
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn first_arena_with_room(&self) -> StoreResult<Option<ArenaNode>> {
        Ok(self.arenas()?.into_iter().find(|arena| arena.room() > 0))
    }

    /// Make every write of this handle durable and visible
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; nothing is applied in that case.
    fn commit(self) -> StoreResult<()>
    where
        Self: Sized;

    /// Discard every write of this handle
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails to abort.
    fn rollback(self) -> StoreResult<()>
    where
        Self: Sized;
}
