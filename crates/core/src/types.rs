//! `TierMem` Core Types
//!
//! Typed identifiers for every entity of the capacity hierarchy and the ledger.
//! Ids are allocated from per-kind monotonically increasing sequences, so
//! ascending id order is creation order (the first-fit scan order).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw sequence value
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw sequence value
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of an arena (child of Ram)
    ArenaId,
    "arena"
);
entity_id!(
    /// Identifier of a pool (child of an arena)
    PoolId,
    "pool"
);
entity_id!(
    /// Identifier of a block (child of a pool)
    BlockId,
    "block"
);
entity_id!(
    /// Identifier of a ledger entry (one fragment of one object)
    LedgerEntryId,
    "ledger"
);

/// Entity kinds that draw ids from a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Arena sequence
    Arena,
    /// Pool sequence
    Pool,
    /// Block sequence
    Block,
    /// Ledger entry sequence
    LedgerEntry,
}

impl EntityKind {
    /// Stable name used as the sequence key in persistent stores
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arena => "arena",
            Self::Pool => "pool",
            Self::Block => "block",
            Self::LedgerEntry => "ledger_entry",
        }
    }
}

/// Reference to one node of the capacity hierarchy, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    /// The root Ram node
    Ram,
    /// An arena
    Arena(ArenaId),
    /// A pool
    Pool(PoolId),
    /// A block
    Block(BlockId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ram => f.write_str("ram"),
            Self::Arena(id) => id.fmt(f),
            Self::Pool(id) => id.fmt(f),
            Self::Block(id) => id.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(ArenaId::new(3).to_string(), "arena-3");
        assert_eq!(BlockId::new(12).to_string(), "block-12");
        assert_eq!(NodeRef::Pool(PoolId::new(1)).to_string(), "pool-1");
        assert_eq!(NodeRef::Ram.to_string(), "ram");
    }

    #[test]
    fn test_id_ordering_follows_sequence() {
        assert!(BlockId::new(1) < BlockId::new(2));
        assert_eq!(u64::from(LedgerEntryId::new(9)), 9);
    }

    #[test]
    fn test_id_serializes_transparently() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&PoolId::new(42))?;
        assert_eq!(json, "42");
        let back: PoolId = serde_json::from_str(&json)?;
        assert_eq!(back, PoolId::new(42));
        Ok(())
    }
}
