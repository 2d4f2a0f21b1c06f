//! In-memory transactional store
//!
//! A handle locks the tables and writes to them in place, logging the
//! previous value of every record it touches. `commit` drops the log;
//! `rollback` (or dropping the handle) replays it backwards. The lock is held
//! for the handle's lifetime, so handles are serialized and a transaction
//! costs only what it writes.

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;

use super::{Store, StoreTransaction};
use crate::error::StoreResult;
use crate::memory::identity::ObjectId;
use crate::memory::ledger::{LedgerEntry, StoredObject};
use crate::memory::nodes::{ArenaNode, BlockNode, Container, PoolNode, RamNode};
use crate::types::{ArenaId, BlockId, EntityKind, LedgerEntryId, PoolId};

#[derive(Debug, Default)]
struct Tables {
    ram: Option<RamNode>,
    sequences: BTreeMap<EntityKind, u64>,
    arenas: BTreeMap<ArenaId, ArenaNode>,
    pools: BTreeMap<PoolId, PoolNode>,
    blocks: BTreeMap<BlockId, BlockNode>,
    objects: BTreeMap<ObjectId, StoredObject>,
    ledger: BTreeMap<LedgerEntryId, LedgerEntry>,
}

/// Previous state of one record, restored on rollback
#[derive(Debug)]
enum Undo {
    Ram(Option<RamNode>),
    Sequence(EntityKind, Option<u64>),
    Arena(ArenaId, Option<ArenaNode>),
    Pool(PoolId, Option<PoolNode>),
    Block(BlockId, Option<BlockNode>),
    Object(ObjectId, Option<StoredObject>),
    Ledger(LedgerEntryId, Option<LedgerEntry>),
}

fn restore<K: Ord, V>(table: &mut BTreeMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            table.insert(key, value);
        }
        None => {
            table.remove(&key);
        }
    }
}

impl Tables {
    fn undo(&mut self, step: Undo) {
        match step {
            Undo::Ram(previous) => self.ram = previous,
            Undo::Sequence(kind, previous) => restore(&mut self.sequences, kind, previous),
            Undo::Arena(id, previous) => restore(&mut self.arenas, id, previous),
            Undo::Pool(id, previous) => restore(&mut self.pools, id, previous),
            Undo::Block(id, previous) => restore(&mut self.blocks, id, previous),
            Undo::Object(id, previous) => restore(&mut self.objects, id, previous),
            Undo::Ledger(id, previous) => restore(&mut self.ledger, id, previous),
        }
    }
}

/// Volatile store keeping every table in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> StoreResult<Self::Transaction<'_>> {
        Ok(MemoryTransaction {
            tables: self.tables.lock(),
            undo: Vec::new(),
        })
    }
}

/// Transaction handle of a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    tables: MutexGuard<'a, Tables>,
    undo: Vec<Undo>,
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        while let Some(step) = self.undo.pop() {
            self.tables.undo(step);
        }
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn load_ram(&self) -> StoreResult<Option<RamNode>> {
        Ok(self.tables.ram)
    }

    fn save_ram(&mut self, ram: &RamNode) -> StoreResult<()> {
        let previous = self.tables.ram.replace(*ram);
        self.undo.push(Undo::Ram(previous));
        Ok(())
    }

    fn next_id(&mut self, kind: EntityKind) -> StoreResult<u64> {
        let previous = self.tables.sequences.get(&kind).copied();
        let next = previous.unwrap_or(0) + 1;
        self.tables.sequences.insert(kind, next);
        self.undo.push(Undo::Sequence(kind, previous));
        Ok(next)
    }

    fn arenas(&self) -> StoreResult<Vec<ArenaNode>> {
        Ok(self.tables.arenas.values().copied().collect())
    }

    fn arena(&self, id: ArenaId) -> StoreResult<Option<ArenaNode>> {
        Ok(self.tables.arenas.get(&id).copied())
    }

    fn save_arena(&mut self, arena: &ArenaNode) -> StoreResult<()> {
        let previous = self.tables.arenas.insert(arena.id, *arena);
        self.undo.push(Undo::Arena(arena.id, previous));
        Ok(())
    }

    fn delete_arena(&mut self, id: ArenaId) -> StoreResult<()> {
        if let Some(previous) = self.tables.arenas.remove(&id) {
            self.undo.push(Undo::Arena(id, Some(previous)));
        }
        Ok(())
    }

    fn pools(&self) -> StoreResult<Vec<PoolNode>> {
        Ok(self.tables.pools.values().copied().collect())
    }

    fn pool(&self, id: PoolId) -> StoreResult<Option<PoolNode>> {
        Ok(self.tables.pools.get(&id).copied())
    }

    fn save_pool(&mut self, pool: &PoolNode) -> StoreResult<()> {
        let previous = self.tables.pools.insert(pool.id, *pool);
        self.undo.push(Undo::Pool(pool.id, previous));
        Ok(())
    }

    fn delete_pool(&mut self, id: PoolId) -> StoreResult<()> {
        if let Some(previous) = self.tables.pools.remove(&id) {
            self.undo.push(Undo::Pool(id, Some(previous)));
        }
        Ok(())
    }

    fn blocks(&self) -> StoreResult<Vec<BlockNode>> {
        Ok(self.tables.blocks.values().copied().collect())
    }

    fn block(&self, id: BlockId) -> StoreResult<Option<BlockNode>> {
        Ok(self.tables.blocks.get(&id).copied())
    }

    fn save_block(&mut self, block: &BlockNode) -> StoreResult<()> {
        let previous = self.tables.blocks.insert(block.id, *block);
        self.undo.push(Undo::Block(block.id, previous));
        Ok(())
    }

    fn delete_block(&mut self, id: BlockId) -> StoreResult<()> {
        if let Some(previous) = self.tables.blocks.remove(&id) {
            self.undo.push(Undo::Block(id, Some(previous)));
        }
        Ok(())
    }

    fn object(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        Ok(self.tables.objects.get(id).cloned())
    }

    fn save_object(&mut self, object: &StoredObject) -> StoreResult<()> {
        let previous = self
            .tables
            .objects
            .insert(object.object_id.clone(), object.clone());
        self.undo
            .push(Undo::Object(object.object_id.clone(), previous));
        Ok(())
    }

    fn delete_object(&mut self, id: &ObjectId) -> StoreResult<()> {
        if let Some(previous) = self.tables.objects.remove(id) {
            self.undo.push(Undo::Object(id.clone(), Some(previous)));
        }
        Ok(())
    }

    fn object_count(&self) -> StoreResult<u64> {
        Ok(self.tables.objects.len() as u64)
    }

    fn ledger(&self) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self.tables.ledger.values().cloned().collect())
    }

    fn save_ledger_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        let previous = self.tables.ledger.insert(entry.id, entry.clone());
        self.undo.push(Undo::Ledger(entry.id, previous));
        Ok(())
    }

    fn delete_ledger_of(&mut self, id: &ObjectId) -> StoreResult<usize> {
        let doomed: Vec<LedgerEntryId> = self
            .tables
            .ledger
            .values()
            .filter(|entry| &entry.object_id == id)
            .map(|entry| entry.id)
            .collect();
        for entry_id in &doomed {
            if let Some(previous) = self.tables.ledger.remove(entry_id) {
                self.undo.push(Undo::Ledger(*entry_id, Some(previous)));
            }
        }
        Ok(doomed.len())
    }

    fn ledger_of(&self, id: &ObjectId) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .tables
            .ledger
            .values()
            .filter(|entry| &entry.object_id == id)
            .cloned()
            .collect())
    }

    fn pools_in(&self, arena_id: ArenaId) -> StoreResult<Vec<PoolNode>> {
        Ok(self
            .tables
            .pools
            .values()
            .filter(|pool| pool.arena_id == arena_id)
            .copied()
            .collect())
    }

    fn blocks_in(&self, pool_id: PoolId) -> StoreResult<Vec<BlockNode>> {
        Ok(self
            .tables
            .blocks
            .values()
            .filter(|block| block.pool_id == pool_id)
            .copied()
            .collect())
    }

    fn first_block_with_room(&self) -> StoreResult<Option<BlockNode>> {
        Ok(self
            .tables
            .blocks
            .values()
            .find(|block| block.is_free())
            .copied())
    }

    fn first_pool_with_room(&self) -> StoreResult<Option<PoolNode>> {
        Ok(self
            .tables
            .pools
            .values()
            .find(|pool| pool.room() > 0)
            .copied())
    }

    fn first_arena_with_room(&self) -> StoreResult<Option<ArenaNode>> {
        Ok(self
            .tables
            .arenas
            .values()
            .find(|arena| arena.room() > 0)
            .copied())
    }

    fn commit(mut self) -> StoreResult<()> {
        self.undo.clear();
        Ok(())
    }

    fn rollback(self) -> StoreResult<()> {
        drop(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CapacityNode;

    #[test]
    fn test_commit_makes_writes_visible() -> StoreResult<()> {
        let store = MemoryStore::new();

        let mut txn = store.begin()?;
        txn.save_ram(&RamNode::new(1_000))?;
        txn.commit()?;

        let txn = store.begin()?;
        assert_eq!(txn.load_ram()?, Some(RamNode::new(1_000)));
        Ok(())
    }

    #[test]
    fn test_rollback_discards_writes() -> StoreResult<()> {
        let store = MemoryStore::new();

        let mut txn = store.begin()?;
        let id = txn.next_id(EntityKind::Arena)?;
        txn.save_arena(&ArenaNode::new(ArenaId::new(id), 500))?;
        txn.rollback()?;

        let mut txn = store.begin()?;
        assert!(txn.arenas()?.is_empty());
        // Sequences roll back with everything else.
        assert_eq!(txn.next_id(EntityKind::Arena)?, 1);
        Ok(())
    }

    #[test]
    fn test_dropped_handle_restores_overwritten_and_deleted_records() -> StoreResult<()> {
        let store = MemoryStore::new();
        let object_id = ObjectId::from_content(b"kept");
        let entry = LedgerEntry {
            id: LedgerEntryId::new(1),
            object_id: object_id.clone(),
            arena_id: ArenaId::new(1),
            pool_id: PoolId::new(1),
            block_id: BlockId::new(1),
            allocated_bytes: 20,
        };
        let block = BlockNode::new(BlockId::new(1), PoolId::new(1), 50);

        let mut txn = store.begin()?;
        txn.save_block(&block)?;
        txn.save_ledger_entry(&entry)?;
        txn.commit()?;

        {
            let mut txn = store.begin()?;
            let mut used = block;
            used.usage.used = 20;
            txn.save_block(&used)?;
            txn.save_block(&BlockNode::new(BlockId::new(2), PoolId::new(1), 50))?;
            assert_eq!(txn.delete_ledger_of(&object_id)?, 1);
            txn.delete_block(BlockId::new(1))?;
            assert!(txn.ledger()?.is_empty());
        }

        let txn = store.begin()?;
        assert_eq!(txn.blocks()?, vec![block]);
        assert_eq!(txn.ledger()?, vec![entry]);
        Ok(())
    }

    #[test]
    fn test_reads_see_own_writes() -> StoreResult<()> {
        let store = MemoryStore::new();
        let mut txn = store.begin()?;
        let block = BlockNode::new(BlockId::new(1), PoolId::new(1), 50);
        txn.save_block(&block)?;
        assert_eq!(txn.block(BlockId::new(1))?, Some(block));
        assert_eq!(txn.blocks_in(PoolId::new(1))?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_first_block_with_room_is_first_fit() -> StoreResult<()> {
        let store = MemoryStore::new();
        let mut txn = store.begin()?;

        let mut full = BlockNode::new(BlockId::new(1), PoolId::new(1), 50);
        full.usage.used = 50;
        let mut partial = BlockNode::new(BlockId::new(2), PoolId::new(1), 50);
        partial.usage.used = 10;
        let empty = BlockNode::new(BlockId::new(3), PoolId::new(1), 50);

        txn.save_block(&empty)?;
        txn.save_block(&partial)?;
        txn.save_block(&full)?;

        let found = txn.first_block_with_room()?;
        assert_eq!(found.map(|block| block.id), Some(BlockId::new(2)));
        assert_eq!(found.map(|block| block.remaining()), Some(40));
        Ok(())
    }
}
