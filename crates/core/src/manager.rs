//! Memory Manager - Transactional facade over the hierarchy
//!
//! Every public operation opens exactly one store transaction, runs the
//! algorithm from [`crate::memory`] against it and commits on success. Any
//! error rolls the whole operation back, so a failed allocation leaves no
//! record, no fragment, no counter change and no new node behind.

use std::time::Instant;

use tracing::{error, info, warn};

use crate::config::AllocatorConfig;
use crate::error::{AllocatorError, AllocatorResult};
use crate::memory::nodes::RamNode;
use crate::memory::{
    allocator, hierarchy, ledger, reclaimer, stats, Allocation, CapacityNode, GcReport, LedgerEntry,
    MemoryStats, Object, ObjectId, StoredObject,
};
use crate::store::{MemoryStore, Store, StoreTransaction};
use crate::telemetry;
use crate::types::{ArenaId, BlockId, PoolId};

/// Allocation facade owning a store and the tier configuration
///
/// Operations take `&self`; the store's transaction handle serializes them,
/// so a manager can be shared between threads when its store can.
#[derive(Debug)]
pub struct MemoryManager<S: Store> {
    store: S,
    config: AllocatorConfig,
}

impl MemoryManager<MemoryStore> {
    /// Manager over a fresh volatile store
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn in_memory(config: AllocatorConfig) -> AllocatorResult<Self> {
        Self::new(MemoryStore::new(), config)
    }
}

impl<S: Store> MemoryManager<S> {
    /// Create a manager, initializing the Ram record on first use
    ///
    /// A store that already holds a hierarchy is resumed as is.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, or if the store was
    /// initialized with a different Ram capacity.
    pub fn new(store: S, config: AllocatorConfig) -> AllocatorResult<Self> {
        config.validate()?;

        let mut txn = store.begin()?;
        let outcome = Self::initialize(&mut txn, &config);
        let resumed = finish(txn, "initialize", outcome)?;
        if resumed {
            info!(ram_capacity = config.tiers.ram_capacity, "Resumed existing hierarchy");
        } else {
            info!(ram_capacity = config.tiers.ram_capacity, "Initialized Ram");
        }

        Ok(Self { store, config })
    }

    fn initialize(txn: &mut S::Transaction<'_>, config: &AllocatorConfig) -> AllocatorResult<bool> {
        match txn.load_ram()? {
            Some(ram) if ram.capacity() == config.tiers.ram_capacity => Ok(true),
            Some(ram) => Err(AllocatorError::config(format!(
                "store holds Ram of {} bytes but configuration asks for {}",
                ram.capacity(),
                config.tiers.ram_capacity
            ))),
            None => {
                txn.save_ram(&RamNode::new(config.tiers.ram_capacity))?;
                Ok(false)
            }
        }
    }

    /// Tier configuration
    #[must_use]
    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Underlying store
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Store an object and return its identifier
    ///
    /// Storing content that is already present is a no-op returning the
    /// existing identifier.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientMemory` if the object exceeds Ram's capacity and
    /// `RamExhausted` if there is not enough free space left.
    pub fn allocate(&self, object: &Object) -> AllocatorResult<ObjectId> {
        self.allocate_detailed(object)
            .map(|allocation| allocation.object_id)
    }

    /// Store an object and report how it was placed
    ///
    /// # Errors
    ///
    /// Same as [`Self::allocate`].
    pub fn allocate_detailed(&self, object: &Object) -> AllocatorResult<Allocation> {
        let started = Instant::now();
        let mut txn = self.store.begin()?;
        let outcome = allocator::allocate(&mut txn, &self.config.tiers, object);
        let allocation = finish(txn, "allocate", outcome)?;

        if allocation.deduplicated {
            info!(object_id = %allocation.object_id, "Object already stored");
        } else {
            info!(
                object_id = %allocation.object_id,
                bytes = allocation.bytes,
                fragments = allocation.fragments,
                elapsed_us = started.elapsed().as_micros(),
                "Allocated object"
            );
        }
        telemetry::record_allocation(&allocation);
        Ok(allocation)
    }

    /// Release an object's bytes and delete its records
    ///
    /// Blocks stay in place and are reused by later allocations until
    /// [`Self::garbage_collect`] removes the empty ones.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the object is not stored.
    pub fn free(&self, object_id: &ObjectId) -> AllocatorResult<()> {
        let mut txn = self.store.begin()?;
        let outcome = reclaimer::free(&mut txn, object_id);
        let release = finish(txn, "free", outcome)?;

        info!(
            object_id = %release.object_id,
            bytes = release.bytes,
            fragments = release.fragments,
            "Freed object"
        );
        telemetry::record_release(&release);
        Ok(())
    }

    /// Stored record of an object, `None` if it is not stored
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub fn get(&self, object_id: &ObjectId) -> AllocatorResult<Option<StoredObject>> {
        let txn = self.store.begin()?;
        let outcome = txn.object(object_id).map_err(AllocatorError::from);
        finish_read(txn, outcome)
    }

    /// Object has a stored record
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub fn is_stored(&self, object_id: &ObjectId) -> AllocatorResult<bool> {
        let txn = self.store.begin()?;
        let outcome = ledger::is_stored(&txn, object_id);
        finish_read(txn, outcome)
    }

    /// Ledger entries of an object in entry order
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub fn fragments_of(&self, object_id: &ObjectId) -> AllocatorResult<Vec<LedgerEntry>> {
        let txn = self.store.begin()?;
        let outcome = ledger::fragments_of(&txn, object_id);
        finish_read(txn, outcome)
    }

    /// Snapshot of node counts, byte usage and record counts
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub fn stats(&self) -> AllocatorResult<MemoryStats> {
        let txn = self.store.begin()?;
        let outcome = stats::collect(&txn);
        let snapshot = finish_read(txn, outcome)?;
        telemetry::record_stats(&snapshot);
        Ok(snapshot)
    }

    /// Write the current statistics to the log at INFO
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub fn log_stats(&self) -> AllocatorResult<MemoryStats> {
        let snapshot = self.stats()?;
        info!(
            arenas = snapshot.arena_count,
            pools = snapshot.pool_count,
            blocks = snapshot.block_count,
            free_blocks = snapshot.free_block_count,
            used_bytes = snapshot.used_bytes,
            free_bytes = snapshot.free_bytes,
            objects = snapshot.object_count,
            ledger_entries = snapshot.ledger_entry_count,
            "Memory statistics"
        );
        Ok(snapshot)
    }

    /// Remove empty blocks, then childless pools, then childless arenas
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if a childless node still reports usage.
    pub fn garbage_collect(&self) -> AllocatorResult<GcReport> {
        let mut txn = self.store.begin()?;
        let outcome = reclaimer::garbage_collect(&mut txn);
        let report = finish(txn, "garbage_collect", outcome)?;

        info!(
            blocks = report.blocks_removed,
            pools = report.pools_removed,
            arenas = report.arenas_removed,
            "Garbage collection complete"
        );
        telemetry::record_gc(&report);
        Ok(report)
    }

    /// Pre-create an empty arena
    ///
    /// # Errors
    ///
    /// Returns `RamExhausted` if Ram has no room for another arena.
    pub fn add_arena(&self) -> AllocatorResult<ArenaId> {
        let mut txn = self.store.begin()?;
        let outcome = hierarchy::add_arena(&mut txn, &self.config.tiers);
        finish(txn, "add_arena", outcome).map(|arena| arena.id)
    }

    /// Pre-create an empty pool in an arena
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` for an unknown arena and `CapacityExceeded`
    /// if the arena has no room for another pool.
    pub fn add_pool(&self, arena_id: ArenaId) -> AllocatorResult<PoolId> {
        let mut txn = self.store.begin()?;
        let outcome = hierarchy::add_pool(&mut txn, arena_id, &self.config.tiers);
        finish(txn, "add_pool", outcome).map(|pool| pool.id)
    }

    /// Pre-create an empty block in a pool
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` for an unknown pool and `CapacityExceeded`
    /// if the pool has no room for another block.
    pub fn add_block(&self, pool_id: PoolId) -> AllocatorResult<BlockId> {
        let mut txn = self.store.begin()?;
        let outcome = hierarchy::add_block(&mut txn, pool_id, &self.config.tiers);
        finish(txn, "add_block", outcome).map(|block| block.id)
    }

    /// Audit counters, reservations and the ledger
    ///
    /// # Errors
    ///
    /// Returns `Corruption` describing every violated invariant.
    pub fn verify_integrity(&self) -> AllocatorResult<()> {
        let txn = self.store.begin()?;
        let outcome = stats::verify_integrity(&txn);
        if let Err(err) = &outcome {
            error!(error = %err, "Integrity check failed");
        }
        finish_read(txn, outcome)
    }
}

/// Commit on success, roll back on failure
fn finish<T, R>(txn: T, operation: &'static str, outcome: AllocatorResult<R>) -> AllocatorResult<R>
where
    T: StoreTransaction,
{
    match outcome {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback() {
                error!(operation, error = %rollback_err, "Rollback failed");
            }
            if err.is_fatal() {
                error!(operation, error = %err, code = err.code().as_u16(), "Invariant violation, rolled back");
            } else {
                warn!(operation, error = %err, code = err.code().as_u16(), "Operation rolled back");
            }
            telemetry::record_rollback(operation);
            Err(err)
        }
    }
}

/// End a read-only handle
fn finish_read<T, R>(txn: T, outcome: AllocatorResult<R>) -> AllocatorResult<R>
where
    T: StoreTransaction,
{
    txn.rollback()?;
    outcome
}
