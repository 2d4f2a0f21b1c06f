//! Memory Statistics - Snapshot and integrity audit of the hierarchy
//!
//! Implements read-only inspection with:
//! - Node, byte and object counts for one consistent snapshot
//! - A full audit of the counter, reservation and ledger invariants

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::capacity::CapacityNode;
use super::hierarchy;
use super::identity::ObjectId;
use super::nodes::{ArenaNode, BlockNode, Container, PoolNode};
use crate::error::{AllocatorError, AllocatorResult};
use crate::store::StoreTransaction;
use crate::types::{ArenaId, BlockId, PoolId};

/// Point-in-time view of the hierarchy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Arenas in the hierarchy
    pub arena_count: u64,
    /// Pools in the hierarchy
    pub pool_count: u64,
    /// Blocks in the hierarchy
    pub block_count: u64,
    /// Sum of block usage
    pub used_bytes: u64,
    /// Ram capacity minus `used_bytes`
    pub free_bytes: u64,
    /// Blocks with `used < capacity`
    pub free_block_count: u64,
    /// Ram capacity
    pub ram_capacity: u64,
    /// Stored objects
    pub object_count: u64,
    /// Ledger entries
    pub ledger_entry_count: u64,
}

impl MemoryStats {
    /// Memory utilization percentage of Ram
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization_percentage(&self) -> f64 {
        if self.ram_capacity == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.ram_capacity as f64 * 100.0
    }
}

/// Collect a snapshot inside the given transaction
///
/// # Errors
///
/// Returns error if any store read fails or Ram is missing.
pub fn collect<T>(txn: &T) -> AllocatorResult<MemoryStats>
where
    T: StoreTransaction + ?Sized,
{
    let ram = hierarchy::load_ram(txn)?;
    let blocks = txn.blocks()?;

    let used_bytes: u64 = blocks.iter().map(CapacityNode::used).sum();
    let free_block_count = blocks.iter().filter(|block| block.is_free()).count() as u64;

    Ok(MemoryStats {
        arena_count: txn.arenas()?.len() as u64,
        pool_count: txn.pools()?.len() as u64,
        block_count: blocks.len() as u64,
        used_bytes,
        free_bytes: ram.capacity().saturating_sub(used_bytes),
        free_block_count,
        ram_capacity: ram.capacity(),
        object_count: txn.object_count()?,
        ledger_entry_count: txn.ledger()?.len() as u64,
    })
}

/// Audit every hierarchy invariant
///
/// Checks usage bounds, parent usage equal to the sum of child usage, each
/// container's reservation counter against its children's capacities, parent links, block usage equal
/// to the ledger bytes placed there and every object's fragments summing to
/// its size.
///
/// # Errors
///
/// Returns `Corruption` listing every violation found.
pub fn verify_integrity<T>(txn: &T) -> AllocatorResult<()>
where
    T: StoreTransaction + ?Sized,
{
    let ram = hierarchy::load_ram(txn)?;
    let arenas = txn.arenas()?;
    let pools = txn.pools()?;
    let blocks = txn.blocks()?;
    let ledger = txn.ledger()?;

    let arena_index: BTreeMap<ArenaId, &ArenaNode> =
        arenas.iter().map(|arena| (arena.id, arena)).collect();
    let pool_index: BTreeMap<PoolId, &PoolNode> = pools.iter().map(|pool| (pool.id, pool)).collect();
    let block_index: BTreeMap<BlockId, &BlockNode> =
        blocks.iter().map(|block| (block.id, block)).collect();

    let mut violations = Vec::new();

    let mut check_bounds = |node: &dyn CapacityNode| {
        if node.used() > node.capacity() {
            violations.push(format!(
                "{} uses {} of {} bytes",
                node.node_ref(),
                node.used(),
                node.capacity()
            ));
        }
    };
    check_bounds(&ram);
    arenas.iter().for_each(|arena| check_bounds(arena));
    pools.iter().for_each(|pool| check_bounds(pool));
    blocks.iter().for_each(|block| check_bounds(block));

    // Per-parent sums of child (used, capacity).
    let mut arena_sums: BTreeMap<ArenaId, (u64, u64)> = BTreeMap::new();
    let mut pool_sums: BTreeMap<PoolId, (u64, u64)> = BTreeMap::new();
    let mut block_ledger: BTreeMap<BlockId, u64> = BTreeMap::new();
    let mut object_ledger: BTreeMap<ObjectId, u64> = BTreeMap::new();

    for block in &blocks {
        let Some(pool) = pool_index.get(&block.pool_id) else {
            violations.push(format!("{} references missing {}", block.id, block.pool_id));
            continue;
        };
        let sums = pool_sums.entry(pool.id).or_default();
        sums.0 += block.used();
        sums.1 += block.capacity();
    }

    for pool in &pools {
        if !arena_index.contains_key(&pool.arena_id) {
            violations.push(format!("{} references missing {}", pool.id, pool.arena_id));
        }
        let (used, reserved) = pool_sums.get(&pool.id).copied().unwrap_or_default();
        if used != pool.used() {
            violations.push(format!(
                "{} reports {} bytes used but its blocks hold {used}",
                pool.id,
                pool.used()
            ));
        }
        check_reservation(&mut violations, pool, reserved, "blocks");
        let sums = arena_sums.entry(pool.arena_id).or_default();
        sums.0 += pool.used();
        sums.1 += pool.capacity();
    }

    for arena in &arenas {
        let (used, reserved) = arena_sums.get(&arena.id).copied().unwrap_or_default();
        if used != arena.used() {
            violations.push(format!(
                "{} reports {} bytes used but its pools hold {used}",
                arena.id,
                arena.used()
            ));
        }
        check_reservation(&mut violations, arena, reserved, "pools");
    }

    let arena_used: u64 = arenas.iter().map(CapacityNode::used).sum();
    let arena_reserved: u64 = arenas.iter().map(CapacityNode::capacity).sum();
    if arena_used != ram.used() {
        violations.push(format!(
            "ram reports {} bytes used but its arenas hold {arena_used}",
            ram.used()
        ));
    }
    check_reservation(&mut violations, &ram, arena_reserved, "arenas");

    for entry in &ledger {
        match block_index.get(&entry.block_id) {
            Some(block) => {
                let parent_arena = pool_index.get(&block.pool_id).map(|pool| pool.arena_id);
                if block.pool_id != entry.pool_id || parent_arena != Some(entry.arena_id) {
                    violations.push(format!(
                        "{} records {}/{} for {} which lives elsewhere",
                        entry.id, entry.arena_id, entry.pool_id, entry.block_id
                    ));
                }
            }
            None => violations.push(format!("{} references missing {}", entry.id, entry.block_id)),
        }
        if entry.allocated_bytes == 0 {
            violations.push(format!("{} holds zero bytes", entry.id));
        }
        *block_ledger.entry(entry.block_id).or_default() += entry.allocated_bytes;
        *object_ledger.entry(entry.object_id.clone()).or_default() += entry.allocated_bytes;
    }

    for block in &blocks {
        let placed = block_ledger.get(&block.id).copied().unwrap_or_default();
        if placed != block.used() {
            violations.push(format!(
                "{} reports {} bytes used but the ledger places {placed}",
                block.id,
                block.used()
            ));
        }
    }

    for (object_id, bytes) in &object_ledger {
        match txn.object(object_id)? {
            Some(record) if record.raw_size != *bytes => violations.push(format!(
                "object {object_id} records {} bytes but its fragments hold {bytes}",
                record.raw_size
            )),
            Some(_) => {}
            None => violations.push(format!("ledger references missing object {object_id}")),
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(AllocatorError::corruption(violations.join("; ")))
    }
}

/// `children` is the summed capacity of the container's children
fn check_reservation(
    violations: &mut Vec<String>,
    node: &dyn Container,
    children: u64,
    kind: &str,
) {
    if node.reserved() != children {
        violations.push(format!(
            "{} records {} reserved bytes but its {kind} take {children}",
            node.node_ref(),
            node.reserved()
        ));
    }
    if children > node.capacity() {
        violations.push(format!(
            "{} reserves {children} bytes for {kind} beyond its capacity {}",
            node.node_ref(),
            node.capacity()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllocatorConfig, TierConfig};
    use crate::memory::allocator::allocate;
    use crate::memory::identity::Object;
    use crate::memory::nodes::RamNode;
    use crate::memory::reclaimer::free;
    use crate::store::{MemoryStore, Store};

    fn setup() -> AllocatorResult<(MemoryStore, TierConfig)> {
        let tiers = AllocatorConfig::test()?.tiers;
        let store = MemoryStore::new();
        let mut txn = store.begin()?;
        txn.save_ram(&RamNode::new(tiers.ram_capacity))?;
        txn.commit()?;
        Ok((store, tiers))
    }

    #[test]
    fn test_snapshot_counts() -> AllocatorResult<()> {
        let (store, tiers) = setup()?;
        let mut txn = store.begin()?;
        allocate(&mut txn, &tiers, &Object::with_identity("A", 120, Vec::new()))?;

        let stats = collect(&txn)?;
        assert_eq!(stats.arena_count, 1);
        assert_eq!(stats.pool_count, 1);
        assert_eq!(stats.block_count, 3);
        assert_eq!(stats.used_bytes, 120);
        assert_eq!(stats.free_bytes, 880);
        assert_eq!(stats.free_block_count, 1);
        assert_eq!(stats.object_count, 1);
        assert_eq!(stats.ledger_entry_count, 3);
        assert!((stats.utilization_percentage() - 12.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_integrity_holds_through_churn() -> AllocatorResult<()> {
        let (store, tiers) = setup()?;
        let mut txn = store.begin()?;

        let objects: Vec<Object> = (0..6_u64)
            .map(|n| Object::with_identity(&format!("obj-{n}"), 35 * (n + 1), Vec::new()))
            .collect();
        for object in &objects {
            allocate(&mut txn, &tiers, object)?;
            verify_integrity(&txn)?;
        }
        for object in objects.iter().step_by(2) {
            free(&mut txn, object.id())?;
            verify_integrity(&txn)?;
        }
        Ok(())
    }

    #[test]
    fn test_integrity_detects_counter_drift() -> AllocatorResult<()> {
        let (store, tiers) = setup()?;
        let mut txn = store.begin()?;
        allocate(&mut txn, &tiers, &Object::with_identity("A", 30, Vec::new()))?;

        let mut ram = hierarchy::load_ram(&txn)?;
        ram.usage.used += 1;
        txn.save_ram(&ram)?;

        let result = verify_integrity(&txn);
        assert!(matches!(result, Err(AllocatorError::Corruption { .. })));
        Ok(())
    }

    #[test]
    fn test_integrity_detects_reservation_drift() -> AllocatorResult<()> {
        let (store, tiers) = setup()?;
        let mut txn = store.begin()?;
        allocate(&mut txn, &tiers, &Object::with_identity("A", 30, Vec::new()))?;
        verify_integrity(&txn)?;

        let mut pool = txn.pools()?.remove(0);
        pool.reserved += 50;
        txn.save_pool(&pool)?;

        let result = verify_integrity(&txn);
        assert!(matches!(
            result,
            Err(AllocatorError::Corruption { ref details }) if details.contains("reserved")
        ));
        Ok(())
    }
}
