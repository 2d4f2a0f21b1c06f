//! Allocation ledger and deduplication records
//!
//! The ledger says which blocks hold how many bytes of which stored object.
//! Fragments are disjoint byte counts addressed only by their total, so their
//! order carries no meaning; it is still kept stable (ascending entry id) so
//! tests and reclamation are deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{Object, ObjectId};
use crate::error::AllocatorResult;
use crate::store::StoreTransaction;
use crate::types::{ArenaId, BlockId, LedgerEntryId, PoolId};

/// One stored object, unique by `object_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Content-derived identifier
    pub object_id: ObjectId,
    /// Bytes allocated for the object
    pub raw_size: u64,
    /// Opaque payload
    #[serde(with = "payload_hex")]
    pub payload: Vec<u8>,
    /// First allocation time
    pub stored_at: DateTime<Utc>,
}

impl StoredObject {
    /// Record for a freshly allocated object
    #[must_use]
    pub fn new(object: &Object) -> Self {
        Self {
            object_id: object.id().clone(),
            raw_size: object.size(),
            payload: object.payload().to_vec(),
            stored_at: Utc::now(),
        }
    }
}

/// One fragment of one object's storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry id
    pub id: LedgerEntryId,
    /// Object the bytes belong to
    pub object_id: ObjectId,
    /// Arena of the block
    pub arena_id: ArenaId,
    /// Pool of the block
    pub pool_id: PoolId,
    /// Block holding the bytes
    pub block_id: BlockId,
    /// Bytes of the object held by the block
    pub allocated_bytes: u64,
}

/// Object already has a StoredObject record
///
/// # Errors
///
/// Returns error if the store lookup fails.
pub fn is_stored<T>(txn: &T, object_id: &ObjectId) -> AllocatorResult<bool>
where
    T: StoreTransaction + ?Sized,
{
    Ok(txn.object(object_id)?.is_some())
}

/// Ledger entries of an object in ascending entry id order
///
/// # Errors
///
/// Returns error if the store lookup fails.
pub fn fragments_of<T>(txn: &T, object_id: &ObjectId) -> AllocatorResult<Vec<LedgerEntry>>
where
    T: StoreTransaction + ?Sized,
{
    let mut entries = txn.ledger_of(object_id)?;
    entries.sort_by_key(|entry| entry.id);
    Ok(entries)
}

/// Payload bytes as a hex string inside JSON records
mod payload_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}
