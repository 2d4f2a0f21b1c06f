//! Reclamation - releasing objects and pruning empty nodes
//!
//! [`free`] gives an object's bytes back to every node on every fragment's
//! path. Blocks stay in place afterwards and become first-fit candidates
//! again. [`garbage_collect`] is the only way nodes leave the hierarchy.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::capacity::CapacityNode;
use super::hierarchy;
use super::identity::ObjectId;
use super::ledger;
use super::nodes::Container;
use crate::error::{AllocatorError, AllocatorResult};
use crate::store::StoreTransaction;

/// Outcome of freeing one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Identifier that was freed
    pub object_id: ObjectId,
    /// Ledger entries removed
    pub fragments: usize,
    /// Bytes returned to the hierarchy
    pub bytes: u64,
}

/// Nodes removed by one garbage-collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    /// Blocks removed
    pub blocks_removed: u64,
    /// Pools removed
    pub pools_removed: u64,
    /// Arenas removed
    pub arenas_removed: u64,
}

impl GcReport {
    /// Total nodes removed
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.blocks_removed + self.pools_removed + self.arenas_removed
    }
}

/// Release every fragment of an object and delete its records
///
/// # Errors
///
/// - `ObjectNotFound` if no record exists for `object_id`
/// - `Underflow` or `NodeNotFound` if the ledger disagrees with the hierarchy
/// - `Corruption` if the fragments do not add up to the recorded size
pub fn free<T>(txn: &mut T, object_id: &ObjectId) -> AllocatorResult<Release>
where
    T: StoreTransaction + ?Sized,
{
    let Some(record) = txn.object(object_id)? else {
        return Err(AllocatorError::object_not_found(object_id.as_str()));
    };

    let fragments = ledger::fragments_of(txn, object_id)?;
    let mut released = 0_u64;
    for entry in &fragments {
        let path = hierarchy::release(txn, entry.block_id, entry.allocated_bytes)?;
        if path.pool.id != entry.pool_id || path.arena.id != entry.arena_id {
            return Err(AllocatorError::corruption(format!(
                "ledger entry {} points at {}/{} but block {} lives in {}/{}",
                entry.id, entry.arena_id, entry.pool_id, entry.block_id, path.arena.id, path.pool.id
            )));
        }
        released += entry.allocated_bytes;
    }

    if released != record.raw_size {
        return Err(AllocatorError::corruption(format!(
            "object {object_id} records {} bytes but its fragments hold {released}",
            record.raw_size
        )));
    }

    txn.delete_ledger_of(object_id)?;
    txn.delete_object(object_id)?;

    Ok(Release {
        object_id: object_id.clone(),
        fragments: fragments.len(),
        bytes: released,
    })
}

/// Remove empty blocks, then pools left without blocks, then arenas left without pools
///
/// Ram is never removed. Each removal hands the node's capacity back to its
/// parent, so a container with nothing reserved has no children left.
///
/// # Errors
///
/// Returns `Corruption` if a childless pool or arena still reports usage, or
/// if a removed node's parent is missing.
pub fn garbage_collect<T>(txn: &mut T) -> AllocatorResult<GcReport>
where
    T: StoreTransaction + ?Sized,
{
    let mut report = GcReport::default();

    for block in txn.blocks()? {
        if block.is_empty() {
            let mut pool = txn.pool(block.pool_id)?.ok_or_else(|| {
                AllocatorError::corruption(format!(
                    "{} references missing {}",
                    block.id, block.pool_id
                ))
            })?;
            pool.unreserve(block.capacity())?;
            txn.save_pool(&pool)?;
            txn.delete_block(block.id)?;
            report.blocks_removed += 1;
        }
    }

    for pool in txn.pools()? {
        if pool.reserved() == 0 {
            if !pool.is_empty() {
                return Err(AllocatorError::corruption(format!(
                    "{} has no blocks but reports {} bytes used",
                    pool.id,
                    pool.used()
                )));
            }
            let mut arena = txn.arena(pool.arena_id)?.ok_or_else(|| {
                AllocatorError::corruption(format!(
                    "{} references missing {}",
                    pool.id, pool.arena_id
                ))
            })?;
            arena.unreserve(pool.capacity())?;
            txn.save_arena(&arena)?;
            txn.delete_pool(pool.id)?;
            report.pools_removed += 1;
        }
    }

    let mut ram = hierarchy::load_ram(txn)?;
    for arena in txn.arenas()? {
        if arena.reserved() == 0 {
            if !arena.is_empty() {
                return Err(AllocatorError::corruption(format!(
                    "{} has no pools but reports {} bytes used",
                    arena.id,
                    arena.used()
                )));
            }
            ram.unreserve(arena.capacity())?;
            txn.delete_arena(arena.id)?;
            report.arenas_removed += 1;
        }
    }
    if report.arenas_removed > 0 {
        txn.save_ram(&ram)?;
    }

    debug!(
        blocks = report.blocks_removed,
        pools = report.pools_removed,
        arenas = report.arenas_removed,
        "Garbage collection pass complete"
    );
    Ok(report)
}
