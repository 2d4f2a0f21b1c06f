//! First-Fit Allocator - Placing objects across the block hierarchy
//!
//! Implements object allocation with:
//! - Content-addressed deduplication before any capacity is touched
//! - First-fit reuse of partially used blocks in creation order
//! - On-demand growth of blocks, pools and arenas
//! - Fragmentation of large objects with one ledger entry per block touched
//!
//! Every function runs inside the caller's transaction. A failure at any
//! point leaves the handle dirty and the caller must roll it back.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::capacity::CapacityNode;
use super::hierarchy;
use super::identity::{Object, ObjectId};
use super::ledger::{self, LedgerEntry, StoredObject};
use crate::config::TierConfig;
use crate::error::{AllocatorError, AllocatorResult};
use crate::store::StoreTransaction;
use crate::types::{EntityKind, LedgerEntryId};

/// Outcome of one allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Identifier the object is stored under
    pub object_id: ObjectId,
    /// Ledger entries written (0 when deduplicated)
    pub fragments: usize,
    /// Bytes charged to the hierarchy (0 when deduplicated)
    pub bytes: u64,
    /// The object was already stored and nothing was charged
    pub deduplicated: bool,
}

impl Allocation {
    const fn existing(object_id: ObjectId) -> Self {
        Self {
            object_id,
            fragments: 0,
            bytes: 0,
            deduplicated: true,
        }
    }
}

/// Store an object, reusing free blocks first and growing the hierarchy on demand
///
/// The size check runs before deduplication, so an oversized object is
/// rejected even if a record with its id exists.
///
/// # Errors
///
/// - `InsufficientMemory` if the object is larger than Ram's capacity
/// - `RamExhausted` if the hierarchy cannot grow far enough to hold it
/// - store errors from any read or write
pub fn allocate<T>(txn: &mut T, tiers: &TierConfig, object: &Object) -> AllocatorResult<Allocation>
where
    T: StoreTransaction + ?Sized,
{
    let ram = hierarchy::load_ram(txn)?;
    let size = object.size();
    if size > ram.capacity() {
        return Err(AllocatorError::InsufficientMemory {
            requested: size,
            capacity: ram.capacity(),
        });
    }

    let object_id = object.id().clone();
    if ledger::is_stored(txn, &object_id)? {
        debug!(object_id = %object_id, "Object already stored, skipping allocation");
        return Ok(Allocation::existing(object_id));
    }

    txn.save_object(&StoredObject::new(object))?;

    let mut remaining = size;
    let mut fragments = 0_usize;
    while remaining > 0 {
        let block = match hierarchy::find_free_block(txn)? {
            Some(block) => block,
            None => hierarchy::grow(txn, tiers, remaining)?,
        };

        let chunk = remaining.min(block.remaining());
        if chunk == 0 {
            return Err(AllocatorError::corruption(format!(
                "block {} offered for allocation has no room",
                block.id
            )));
        }

        let path = hierarchy::charge(txn, block.id, chunk)?;
        let entry = LedgerEntry {
            id: LedgerEntryId::new(txn.next_id(EntityKind::LedgerEntry)?),
            object_id: object_id.clone(),
            arena_id: path.arena.id,
            pool_id: path.pool.id,
            block_id: path.block.id,
            allocated_bytes: chunk,
        };
        txn.save_ledger_entry(&entry)?;

        debug!(
            object_id = %object_id,
            block = %path.block.id,
            bytes = chunk,
            block_remaining = path.block.remaining(),
            "Placed fragment"
        );

        remaining -= chunk;
        fragments += 1;
    }

    Ok(Allocation {
        object_id,
        fragments,
        bytes: size,
        deduplicated: false,
    })
}
