//! Capacity Node - a container with a maximum capacity and current usage
//!
//! Shared by Block, Pool, Arena and the root Ram node. A node only guards its
//! own counters; propagating a change to the parents is the hierarchy's job.

use serde::{Deserialize, Serialize};

use crate::error::{AllocatorError, AllocatorResult};
use crate::types::NodeRef;

/// Capacity and usage counters of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Maximum number of bytes
    pub capacity: u64,
    /// Bytes currently occupied
    pub used: u64,
}

impl Usage {
    /// Fresh, empty counters
    #[must_use]
    pub const fn empty(capacity: u64) -> Self {
        Self { capacity, used: 0 }
    }
}

/// A container with a maximum capacity and current usage
pub trait CapacityNode {
    /// Reference used in errors and logs
    fn node_ref(&self) -> NodeRef;

    /// Counters of this node
    fn usage(&self) -> &Usage;

    /// Mutable counters of this node
    fn usage_mut(&mut self) -> &mut Usage;

    /// Maximum number of bytes
    fn capacity(&self) -> u64 {
        self.usage().capacity
    }

    /// Bytes currently occupied
    fn used(&self) -> u64 {
        self.usage().used
    }

    /// `capacity - used`
    fn remaining(&self) -> u64 {
        let usage = self.usage();
        usage.capacity.saturating_sub(usage.used)
    }

    /// Nothing stored in this node
    fn is_empty(&self) -> bool {
        self.usage().used == 0
    }

    /// Occupy `amount` more bytes
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if `used + amount > capacity`; the counters are untouched.
    fn add(&mut self, amount: u64) -> AllocatorResult<()> {
        let remaining = self.remaining();
        if amount > remaining {
            return Err(AllocatorError::capacity_exceeded(
                self.node_ref(),
                amount,
                remaining,
            ));
        }
        self.usage_mut().used += amount;
        Ok(())
    }

    /// Release `amount` bytes
    ///
    /// # Errors
    ///
    /// Returns `Underflow` if `amount > used`; the counters are untouched.
    fn subtract(&mut self, amount: u64) -> AllocatorResult<()> {
        let used = self.used();
        if amount > used {
            return Err(AllocatorError::underflow(self.node_ref(), amount, used));
        }
        self.usage_mut().used = used - amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(Usage);

    impl CapacityNode for Probe {
        fn node_ref(&self) -> NodeRef {
            NodeRef::Ram
        }

        fn usage(&self) -> &Usage {
            &self.0
        }

        fn usage_mut(&mut self) -> &mut Usage {
            &mut self.0
        }
    }

    #[test]
    fn test_add_up_to_capacity() -> AllocatorResult<()> {
        let mut node = Probe(Usage::empty(100));
        node.add(60)?;
        node.add(40)?;
        assert_eq!(node.used(), 100);
        assert_eq!(node.remaining(), 0);
        Ok(())
    }

    #[test]
    fn test_add_beyond_capacity_fails_without_change() -> AllocatorResult<()> {
        let mut node = Probe(Usage::empty(100));
        node.add(90)?;
        let result = node.add(11);
        assert!(matches!(
            result,
            Err(AllocatorError::CapacityExceeded {
                requested: 11,
                remaining: 10,
                ..
            })
        ));
        assert_eq!(node.used(), 90);
        Ok(())
    }

    #[test]
    fn test_subtract_underflow() -> AllocatorResult<()> {
        let mut node = Probe(Usage::empty(100));
        node.add(5)?;
        let result = node.subtract(6);
        assert!(matches!(
            result,
            Err(AllocatorError::Underflow {
                requested: 6,
                used: 5,
                ..
            })
        ));
        node.subtract(5)?;
        assert!(node.is_empty());
        Ok(())
    }
}
