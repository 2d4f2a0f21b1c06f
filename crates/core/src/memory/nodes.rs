//! Hierarchy records: Ram → Arena → Pool → Block
//!
//! Ownership is tree shaped. Children carry their parent id as a foreign key;
//! parents never hold child pointers, the store answers "children of" queries.
//!
//! Containers also keep `reserved`, the summed capacity of their children, so
//! growth can decide where a new child fits without listing siblings.

use serde::{Deserialize, Serialize};

use super::capacity::{CapacityNode, Usage};
use crate::error::{AllocatorError, AllocatorResult};
use crate::types::{ArenaId, BlockId, NodeRef, PoolId};

/// A node that hands out parts of its capacity to child nodes
pub trait Container: CapacityNode {
    /// Capacity already handed out to children
    fn reserved(&self) -> u64;

    /// Mutable reservation counter
    fn reserved_mut(&mut self) -> &mut u64;

    /// Capacity still available for a new child
    fn room(&self) -> u64 {
        self.capacity().saturating_sub(self.reserved())
    }

    /// Hand `amount` bytes of capacity to a new child
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if `amount > room()`; the counter is untouched.
    fn reserve(&mut self, amount: u64) -> AllocatorResult<()> {
        let room = self.room();
        if amount > room {
            return Err(AllocatorError::capacity_exceeded(self.node_ref(), amount, room));
        }
        *self.reserved_mut() += amount;
        Ok(())
    }

    /// Take back the capacity of a removed child
    ///
    /// # Errors
    ///
    /// Returns `Underflow` if `amount > reserved()`; the counter is untouched.
    fn unreserve(&mut self, amount: u64) -> AllocatorResult<()> {
        let reserved = self.reserved();
        if amount > reserved {
            return Err(AllocatorError::underflow(self.node_ref(), amount, reserved));
        }
        *self.reserved_mut() = reserved - amount;
        Ok(())
    }
}

/// Root capacity node, created once per manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamNode {
    /// Counters (used is the sum of arena usage)
    pub usage: Usage,
    /// Summed capacity of all arenas
    pub reserved: u64,
}

impl RamNode {
    /// Create an empty Ram node
    #[must_use]
    pub const fn new(capacity: u64) -> Self {
        Self {
            usage: Usage::empty(capacity),
            reserved: 0,
        }
    }
}

/// Arena, owned by Ram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaNode {
    /// Arena id
    pub id: ArenaId,
    /// Counters (used is the sum of pool usage)
    pub usage: Usage,
    /// Summed capacity of the arena's pools
    pub reserved: u64,
}

impl ArenaNode {
    /// Create an empty arena
    #[must_use]
    pub const fn new(id: ArenaId, capacity: u64) -> Self {
        Self {
            id,
            usage: Usage::empty(capacity),
            reserved: 0,
        }
    }
}

/// Pool, owned by one arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolNode {
    /// Pool id
    pub id: PoolId,
    /// Owning arena
    pub arena_id: ArenaId,
    /// Counters (used is the sum of block usage)
    pub usage: Usage,
    /// Summed capacity of the pool's blocks
    pub reserved: u64,
}

impl PoolNode {
    /// Create an empty pool
    #[must_use]
    pub const fn new(id: PoolId, arena_id: ArenaId, capacity: u64) -> Self {
        Self {
            id,
            arena_id,
            usage: Usage::empty(capacity),
            reserved: 0,
        }
    }
}

/// Block, owned by one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNode {
    /// Block id
    pub id: BlockId,
    /// Owning pool
    pub pool_id: PoolId,
    /// Counters (used is the bytes the ledger places here)
    pub usage: Usage,
}

impl BlockNode {
    /// Create an empty block
    #[must_use]
    pub const fn new(id: BlockId, pool_id: PoolId, capacity: u64) -> Self {
        Self {
            id,
            pool_id,
            usage: Usage::empty(capacity),
        }
    }

    /// Block can accept at least one more byte (`used < capacity`)
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.usage.used < self.usage.capacity
    }
}

impl CapacityNode for RamNode {
    fn node_ref(&self) -> NodeRef {
        NodeRef::Ram
    }

    fn usage(&self) -> &Usage {
        &self.usage
    }

    fn usage_mut(&mut self) -> &mut Usage {
        &mut self.usage
    }
}

impl CapacityNode for ArenaNode {
    fn node_ref(&self) -> NodeRef {
        NodeRef::Arena(self.id)
    }

    fn usage(&self) -> &Usage {
        &self.usage
    }

    fn usage_mut(&mut self) -> &mut Usage {
        &mut self.usage
    }
}

impl CapacityNode for PoolNode {
    fn node_ref(&self) -> NodeRef {
        NodeRef::Pool(self.id)
    }

    fn usage(&self) -> &Usage {
        &self.usage
    }

    fn usage_mut(&mut self) -> &mut Usage {
        &mut self.usage
    }
}

impl Container for RamNode {
    fn reserved(&self) -> u64 {
        self.reserved
    }

    fn reserved_mut(&mut self) -> &mut u64 {
        &mut self.reserved
    }
}

impl Container for ArenaNode {
    fn reserved(&self) -> u64 {
        self.reserved
    }

    fn reserved_mut(&mut self) -> &mut u64 {
        &mut self.reserved
    }
}

impl Container for PoolNode {
    fn reserved(&self) -> u64 {
        self.reserved
    }

    fn reserved_mut(&mut self) -> &mut u64 {
        &mut self.reserved
    }
}

impl CapacityNode for BlockNode {
    fn node_ref(&self) -> NodeRef {
        NodeRef::Block(self.id)
    }

    fn usage(&self) -> &Usage {
        &self.usage
    }

    fn usage_mut(&mut self) -> &mut Usage {
        &mut self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> BlockNode {
        BlockNode::new(BlockId::new(1), PoolId::new(1), 50)
    }

    #[test]
    fn test_block_free_when_empty() {
        assert!(block().is_free());
    }

    #[test]
    fn test_block_free_with_one_byte_left() -> AllocatorResult<()> {
        let mut block = block();
        block.add(49)?;
        assert!(block.is_free());
        assert_eq!(block.remaining(), 1);
        Ok(())
    }

    #[test]
    fn test_full_block_is_not_free() -> AllocatorResult<()> {
        let mut block = block();
        block.add(50)?;
        assert!(!block.is_free());
        block.subtract(1)?;
        assert!(block.is_free());
        Ok(())
    }

    #[test]
    fn test_reservation_bounds() -> AllocatorResult<()> {
        let mut arena = ArenaNode::new(ArenaId::new(1), 500);
        arena.reserve(200)?;
        arena.reserve(200)?;
        assert_eq!(arena.room(), 100);

        let result = arena.reserve(101);
        assert!(matches!(result, Err(AllocatorError::CapacityExceeded { .. })));
        assert_eq!(arena.reserved(), 400);

        arena.unreserve(400)?;
        assert_eq!(arena.room(), 500);
        assert!(matches!(arena.unreserve(1), Err(AllocatorError::Underflow { .. })));
        Ok(())
    }

    #[test]
    fn test_node_refs() {
        let pool = PoolNode::new(PoolId::new(7), ArenaId::new(2), 200);
        assert_eq!(pool.node_ref(), NodeRef::Pool(PoolId::new(7)));
        assert_eq!(RamNode::new(10).node_ref(), NodeRef::Ram);
    }
}
