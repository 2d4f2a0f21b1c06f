//! Rollback tests with injected store failures
//!
//! `FailingStore` wraps the in-memory store and fails ledger writes or
//! commits on demand, so every operation's all-or-nothing behaviour can be
//! observed through the public API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tiermem_core::memory::{LedgerEntry, StoredObject};
use tiermem_core::store::MemoryTransaction;
use tiermem_core::{
    AllocatorConfig, AllocatorError, ArenaId, ArenaNode, BlockId, BlockNode, EntityKind,
    MemoryManager, MemoryStore, Object, ObjectId, PoolId, PoolNode, RamNode, Store, StoreError,
    StoreResult, StoreTransaction,
};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const UNLIMITED: usize = usize::MAX;

#[derive(Debug)]
struct FailingStore {
    inner: MemoryStore,
    ledger_writes_left: AtomicUsize,
    fail_commit: AtomicBool,
}

impl FailingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            ledger_writes_left: AtomicUsize::new(UNLIMITED),
            fail_commit: AtomicBool::new(false),
        }
    }

    fn allow_ledger_writes(&self, count: usize) {
        self.ledger_writes_left.store(count, Ordering::SeqCst);
    }

    fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }
}

impl Store for FailingStore {
    type Transaction<'a> = FailingTransaction<'a>;

    fn begin(&self) -> StoreResult<Self::Transaction<'_>> {
        Ok(FailingTransaction {
            inner: self.inner.begin()?,
            store: self,
        })
    }
}

struct FailingTransaction<'a> {
    inner: MemoryTransaction<'a>,
    store: &'a FailingStore,
}

impl StoreTransaction for FailingTransaction<'_> {
    fn load_ram(&self) -> StoreResult<Option<RamNode>> {
        self.inner.load_ram()
    }

    fn save_ram(&mut self, ram: &RamNode) -> StoreResult<()> {
        self.inner.save_ram(ram)
    }

    fn next_id(&mut self, kind: EntityKind) -> StoreResult<u64> {
        self.inner.next_id(kind)
    }

    fn arenas(&self) -> StoreResult<Vec<ArenaNode>> {
        self.inner.arenas()
    }

    fn arena(&self, id: ArenaId) -> StoreResult<Option<ArenaNode>> {
        self.inner.arena(id)
    }

    fn save_arena(&mut self, arena: &ArenaNode) -> StoreResult<()> {
        self.inner.save_arena(arena)
    }

    fn delete_arena(&mut self, id: ArenaId) -> StoreResult<()> {
        self.inner.delete_arena(id)
    }

    fn pools(&self) -> StoreResult<Vec<PoolNode>> {
        self.inner.pools()
    }

    fn pool(&self, id: PoolId) -> StoreResult<Option<PoolNode>> {
        self.inner.pool(id)
    }

    fn save_pool(&mut self, pool: &PoolNode) -> StoreResult<()> {
        self.inner.save_pool(pool)
    }

    fn delete_pool(&mut self, id: PoolId) -> StoreResult<()> {
        self.inner.delete_pool(id)
    }

    fn blocks(&self) -> StoreResult<Vec<BlockNode>> {
        self.inner.blocks()
    }

    fn block(&self, id: BlockId) -> StoreResult<Option<BlockNode>> {
        self.inner.block(id)
    }

    fn save_block(&mut self, block: &BlockNode) -> StoreResult<()> {
        self.inner.save_block(block)
    }

    fn delete_block(&mut self, id: BlockId) -> StoreResult<()> {
        self.inner.delete_block(id)
    }

    fn object(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        self.inner.object(id)
    }

    fn save_object(&mut self, object: &StoredObject) -> StoreResult<()> {
        self.inner.save_object(object)
    }

    fn delete_object(&mut self, id: &ObjectId) -> StoreResult<()> {
        self.inner.delete_object(id)
    }

    fn object_count(&self) -> StoreResult<u64> {
        self.inner.object_count()
    }

    fn ledger(&self) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.ledger()
    }

    fn save_ledger_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        let left = self.store.ledger_writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::backend("save_ledger_entry", "injected failure"));
        }
        if left != UNLIMITED {
            self.store.ledger_writes_left.store(left - 1, Ordering::SeqCst);
        }
        self.inner.save_ledger_entry(entry)
    }

    fn delete_ledger_of(&mut self, id: &ObjectId) -> StoreResult<usize> {
        self.inner.delete_ledger_of(id)
    }

    fn commit(self) -> StoreResult<()> {
        if self.store.fail_commit.load(Ordering::SeqCst) {
            self.inner.rollback()?;
            return Err(StoreError::backend("commit", "injected failure"));
        }
        self.inner.commit()
    }

    fn rollback(self) -> StoreResult<()> {
        self.inner.rollback()
    }
}

fn manager() -> TestResult<MemoryManager<FailingStore>> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Ok(MemoryManager::new(FailingStore::new(), AllocatorConfig::test()?)?)
}

#[test]
fn test_ledger_failure_mid_allocation_leaves_no_trace() -> TestResult<()> {
    let manager = manager()?;
    manager.allocate(&Object::with_identity("resident", 30, Vec::new()))?;
    let before = manager.stats()?;

    // The third fragment's ledger write fails.
    manager.store().allow_ledger_writes(2);
    let object = Object::with_identity("victim", 120, Vec::new());
    let result = manager.allocate(&object);

    match result {
        Err(err @ AllocatorError::Store(StoreError::Backend { .. })) => assert!(err.is_retryable()),
        other => return Err(format!("expected injected store failure, got {other:?}").into()),
    }
    assert_eq!(manager.stats()?, before);
    assert!(!manager.is_stored(object.id())?);
    manager.verify_integrity()?;

    manager.store().allow_ledger_writes(UNLIMITED);
    let allocation = manager.allocate_detailed(&object)?;
    assert_eq!(allocation.fragments, 3);
    manager.verify_integrity()?;
    Ok(())
}

#[test]
fn test_commit_failure_discards_allocation() -> TestResult<()> {
    let manager = manager()?;
    let before = manager.stats()?;

    manager.store().set_fail_commit(true);
    let object = Object::with_identity("never-committed", 75, Vec::new());
    assert!(manager.allocate(&object).is_err());
    manager.store().set_fail_commit(false);

    assert_eq!(manager.stats()?, before);
    assert!(manager.get(object.id())?.is_none());
    Ok(())
}

#[test]
fn test_commit_failure_keeps_object_on_free() -> TestResult<()> {
    let manager = manager()?;
    let object = Object::with_identity("kept", 80, Vec::new());
    manager.allocate(&object)?;
    let before = manager.stats()?;

    manager.store().set_fail_commit(true);
    assert!(manager.free(object.id()).is_err());
    assert!(manager.garbage_collect().is_err());
    manager.store().set_fail_commit(false);

    assert_eq!(manager.stats()?, before);
    assert_eq!(manager.fragments_of(object.id())?.len(), 2);
    Ok(())
}
