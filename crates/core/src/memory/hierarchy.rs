//! Hierarchy - locating and growing the Ram → Arena → Pool → Block tree
//!
//! Reuse comes before growth: [`find_free_block`] scans existing blocks in
//! creation order and [`grow`] only runs when every block is full.
//!
//! Growth is governed by reservation, not usage. A container has room for a
//! new child while the capacities of its children, kept in its `reserved`
//! counter, sum to less than its own.
//! A new child gets `min(tier_capacity, parent_capacity - reserved)`, so the
//! last child of a container may be smaller than the tier size and every
//! byte of Ram stays reachable.
//!
//! Usage counters are propagated explicitly by [`charge`] and [`release`]:
//! block, pool, arena and Ram are updated together inside the caller's
//! transaction, never by hooks.

use tracing::{debug, info};

use super::capacity::CapacityNode;
use super::nodes::{ArenaNode, BlockNode, Container, PoolNode, RamNode};
use crate::config::TierConfig;
use crate::error::{AllocatorError, AllocatorResult};
use crate::store::StoreTransaction;
use crate::types::{ArenaId, BlockId, EntityKind, NodeRef, PoolId};

/// A block together with its owning pool and arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPath {
    /// Owning arena
    pub arena: ArenaNode,
    /// Owning pool
    pub pool: PoolNode,
    /// The block
    pub block: BlockNode,
}

/// Load the root Ram record
///
/// # Errors
///
/// Returns `Corruption` if the store was never initialized.
pub fn load_ram<T>(txn: &T) -> AllocatorResult<RamNode>
where
    T: StoreTransaction + ?Sized,
{
    txn.load_ram()?
        .ok_or_else(|| AllocatorError::corruption("Ram record missing from store"))
}

/// First block in creation order with free capacity
///
/// # Errors
///
/// Returns error if the store lookup fails.
pub fn find_free_block<T>(txn: &T) -> AllocatorResult<Option<BlockNode>>
where
    T: StoreTransaction + ?Sized,
{
    Ok(txn.first_block_with_room()?)
}

/// Create a new arena under Ram
///
/// # Errors
///
/// Returns `RamExhausted` if Ram has no capacity left for another arena.
pub fn add_arena<T>(txn: &mut T, tiers: &TierConfig) -> AllocatorResult<ArenaNode>
where
    T: StoreTransaction + ?Sized,
{
    let mut ram = load_ram(txn)?;
    let room = ram.room();
    if room == 0 {
        return Err(AllocatorError::RamExhausted {
            requested: tiers.arena_capacity,
        });
    }

    let id = ArenaId::new(txn.next_id(EntityKind::Arena)?);
    let arena = ArenaNode::new(id, tiers.arena_capacity.min(room));
    ram.reserve(arena.capacity())?;
    txn.save_ram(&ram)?;
    txn.save_arena(&arena)?;

    info!(arena = %id, capacity = arena.capacity(), "Created arena");
    Ok(arena)
}

/// Create a new pool in an arena
///
/// # Errors
///
/// Returns `NodeNotFound` for an unknown arena and `CapacityExceeded` if the
/// arena has no capacity left for another pool.
pub fn add_pool<T>(txn: &mut T, arena_id: ArenaId, tiers: &TierConfig) -> AllocatorResult<PoolNode>
where
    T: StoreTransaction + ?Sized,
{
    let mut arena = txn
        .arena(arena_id)?
        .ok_or(AllocatorError::node_not_found(NodeRef::Arena(arena_id)))?;
    let room = arena.room();
    if room == 0 {
        return Err(AllocatorError::capacity_exceeded(
            arena.node_ref(),
            tiers.pool_capacity,
            0,
        ));
    }

    let id = PoolId::new(txn.next_id(EntityKind::Pool)?);
    let pool = PoolNode::new(id, arena_id, tiers.pool_capacity.min(room));
    arena.reserve(pool.capacity())?;
    txn.save_arena(&arena)?;
    txn.save_pool(&pool)?;

    info!(pool = %id, arena = %arena_id, capacity = pool.capacity(), "Created pool");
    Ok(pool)
}

/// Create a new block in a pool
///
/// # Errors
///
/// Returns `NodeNotFound` for an unknown pool and `CapacityExceeded` if the
/// pool has no capacity left for another block.
pub fn add_block<T>(txn: &mut T, pool_id: PoolId, tiers: &TierConfig) -> AllocatorResult<BlockNode>
where
    T: StoreTransaction + ?Sized,
{
    let mut pool = txn
        .pool(pool_id)?
        .ok_or(AllocatorError::node_not_found(NodeRef::Pool(pool_id)))?;
    let room = pool.room();
    if room == 0 {
        return Err(AllocatorError::capacity_exceeded(
            pool.node_ref(),
            tiers.block_capacity,
            0,
        ));
    }

    let id = BlockId::new(txn.next_id(EntityKind::Block)?);
    let block = BlockNode::new(id, pool_id, tiers.block_capacity.min(room));
    pool.reserve(block.capacity())?;
    txn.save_pool(&pool)?;
    txn.save_block(&block)?;

    debug!(block = %id, pool = %pool_id, capacity = block.capacity(), "Created block");
    Ok(block)
}

/// Create a fresh block, adding a pool and an arena only when needed
///
/// The chosen arena is the first (creation order) that either owns a pool
/// with room for a block or has room for a new pool; inside it an existing
/// pool wins over a new one. `pending` is the number of bytes still waiting
/// for a block and is reported in `RamExhausted`.
///
/// # Errors
///
/// Returns `RamExhausted` when neither an existing container nor Ram has room.
pub fn grow<T>(txn: &mut T, tiers: &TierConfig, pending: u64) -> AllocatorResult<BlockNode>
where
    T: StoreTransaction + ?Sized,
{
    let pool = txn.first_pool_with_room()?;
    let arena = txn.first_arena_with_room()?;

    match (pool, arena) {
        (Some(pool), Some(arena)) if arena.id < pool.arena_id => {
            let pool = add_pool(txn, arena.id, tiers)?;
            add_block(txn, pool.id, tiers)
        }
        (Some(pool), _) => add_block(txn, pool.id, tiers),
        (None, Some(arena)) => {
            let pool = add_pool(txn, arena.id, tiers)?;
            add_block(txn, pool.id, tiers)
        }
        (None, None) => {
            let arena = add_arena(txn, tiers).map_err(|err| match err {
                AllocatorError::RamExhausted { .. } => {
                    AllocatorError::RamExhausted { requested: pending }
                }
                other => other,
            })?;
            let pool = add_pool(txn, arena.id, tiers)?;
            add_block(txn, pool.id, tiers)
        }
    }
}

/// Resolve a block and its ancestors
///
/// # Errors
///
/// Returns `NodeNotFound` if any link of the parent chain is missing.
pub fn resolve_path<T>(txn: &T, block_id: BlockId) -> AllocatorResult<BlockPath>
where
    T: StoreTransaction + ?Sized,
{
    let block = txn
        .block(block_id)?
        .ok_or(AllocatorError::node_not_found(NodeRef::Block(block_id)))?;
    let pool = txn
        .pool(block.pool_id)?
        .ok_or(AllocatorError::node_not_found(NodeRef::Pool(block.pool_id)))?;
    let arena = txn
        .arena(pool.arena_id)?
        .ok_or(AllocatorError::node_not_found(NodeRef::Arena(pool.arena_id)))?;
    Ok(BlockPath { arena, pool, block })
}

/// Occupy `amount` bytes of a block and propagate to pool, arena and Ram
///
/// # Errors
///
/// Returns `CapacityExceeded` if any node on the path would overflow; nothing
/// is written in that case.
pub fn charge<T>(txn: &mut T, block_id: BlockId, amount: u64) -> AllocatorResult<BlockPath>
where
    T: StoreTransaction + ?Sized,
{
    let mut path = resolve_path(txn, block_id)?;
    let mut ram = load_ram(txn)?;

    path.block.add(amount)?;
    path.pool.add(amount)?;
    path.arena.add(amount)?;
    ram.add(amount)?;

    persist(txn, &path, &ram)?;
    Ok(path)
}

/// Release `amount` bytes of a block and propagate to pool, arena and Ram
///
/// # Errors
///
/// Returns `Underflow` if any node on the path holds fewer bytes; nothing is
/// written in that case.
pub fn release<T>(txn: &mut T, block_id: BlockId, amount: u64) -> AllocatorResult<BlockPath>
where
    T: StoreTransaction + ?Sized,
{
    let mut path = resolve_path(txn, block_id)?;
    let mut ram = load_ram(txn)?;

    path.block.subtract(amount)?;
    path.pool.subtract(amount)?;
    path.arena.subtract(amount)?;
    ram.subtract(amount)?;

    persist(txn, &path, &ram)?;
    Ok(path)
}

fn persist<T>(txn: &mut T, path: &BlockPath, ram: &RamNode) -> AllocatorResult<()>
where
    T: StoreTransaction + ?Sized,
{
    txn.save_block(&path.block)?;
    txn.save_pool(&path.pool)?;
    txn.save_arena(&path.arena)?;
    txn.save_ram(ram)?;
    Ok(())
}
