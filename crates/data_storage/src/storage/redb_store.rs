//! Persistent store using redb
//!
//! One redb write transaction backs each core transaction handle, so redb's
//! single-writer lock is the serialization the allocator relies on and an
//! aborted handle leaves the file untouched.
//!
//! Schema: one table per entity kind keyed by id, an `objects` table keyed by
//! object id, a `sequences` table of per-kind counters and a `metadata` table
//! holding the Ram record. Values are JSON documents.

use chrono::Utc;
use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tiermem_core::{
    ArenaId, ArenaNode, BlockId, BlockNode, EntityKind, LedgerEntry, ObjectId, PoolId, PoolNode,
    RamNode, Store, StoreError, StoreResult, StoreTransaction, StoredObject,
};

use crate::{
    config::RedbStoreConfig,
    error::{DataStorageError, DataStorageResult},
    types::StorageMetrics,
};

type EntityTable = TableDefinition<'static, u64, &'static [u8]>;

/// Table definitions for redb
const ARENAS_TABLE: EntityTable = TableDefinition::new("arenas");
const POOLS_TABLE: EntityTable = TableDefinition::new("pools");
const BLOCKS_TABLE: EntityTable = TableDefinition::new("blocks");
const LEDGER_TABLE: EntityTable = TableDefinition::new("ledger");
const OBJECTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");
const SEQUENCES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequences");
const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

const RAM_KEY: &str = "ram";

/// Metrics kept in memory before the oldest half is dropped
const METRICS_CAPACITY: usize = 1_000;

/// Commits slower than this are logged
const SLOW_COMMIT: Duration = Duration::from_millis(1);

fn backend<E: Display>(operation: &'static str) -> impl FnOnce(E) -> StoreError {
    move |err| StoreError::backend(operation, err)
}

/// Store backed by an embedded redb database
#[derive(Debug)]
pub struct RedbStore {
    /// redb database instance
    database: Arc<Database>,

    /// Configuration
    config: RedbStoreConfig,

    /// Per-transaction metrics
    metrics: Arc<Mutex<Vec<StorageMetrics>>>,
}

impl RedbStore {
    /// Open or create a database and make sure every table exists
    ///
    /// # Errors
    ///
    /// Returns error if the configuration names no backend or the database
    /// cannot be opened.
    pub fn open(config: &RedbStoreConfig) -> DataStorageResult<Self> {
        let database = if config.use_memory_storage {
            Database::builder()
                .set_cache_size(config.cache_size())
                .create_with_backend(redb::backends::InMemoryBackend::new())
                .map_err(|e| {
                    DataStorageError::database(
                        "database_open",
                        format!("Failed to create in-memory database: {e}"),
                    )
                })?
        } else if let Some(ref path) = config.database_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            Database::builder()
                .set_cache_size(config.cache_size())
                .create(path)
                .map_err(|e| {
                    DataStorageError::database(
                        "database_open",
                        format!("Failed to open database {}: {e}", path.display()),
                    )
                })?
        } else {
            return Err(DataStorageError::configuration(
                "Either use_memory_storage must be true or database_path must be provided",
            ));
        };

        Self::create_tables(&database)?;
        tracing::info!(
            path = ?config.database_path,
            in_memory = config.use_memory_storage,
            "Opened redb store"
        );

        Ok(Self {
            database: Arc::new(database),
            config: config.clone(),
            metrics: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// In-memory database with default cache settings
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created.
    pub fn in_memory() -> DataStorageResult<Self> {
        Self::open(&RedbStoreConfig::in_memory())
    }

    fn create_tables(database: &Database) -> DataStorageResult<()> {
        let write_txn = database
            .begin_write()
            .map_err(|e| DataStorageError::database("begin_write", e.to_string()))?;

        {
            for table in [ARENAS_TABLE, POOLS_TABLE, BLOCKS_TABLE, LEDGER_TABLE] {
                write_txn
                    .open_table(table)
                    .map_err(|e| DataStorageError::database("open_table", e.to_string()))?;
            }
            write_txn
                .open_table(OBJECTS_TABLE)
                .map_err(|e| DataStorageError::database("open_objects_table", e.to_string()))?;
            write_txn
                .open_table(SEQUENCES_TABLE)
                .map_err(|e| DataStorageError::database("open_sequences_table", e.to_string()))?;
            write_txn
                .open_table(METADATA_TABLE)
                .map_err(|e| DataStorageError::database("open_metadata_table", e.to_string()))?;
        }

        write_txn
            .commit()
            .map_err(|e| DataStorageError::database("commit_init", e.to_string()))
    }

    /// Configuration the store was opened with
    #[must_use]
    pub const fn config(&self) -> &RedbStoreConfig {
        &self.config
    }

    /// Recent transaction metrics, oldest first
    #[must_use]
    pub fn metrics(&self) -> Vec<StorageMetrics> {
        self.metrics.lock().clone()
    }

    /// Perform health check on storage
    ///
    /// # Errors
    ///
    /// Returns error if the metadata table cannot be read.
    pub fn health_check(&self) -> DataStorageResult<()> {
        let read_txn = self
            .database
            .begin_read()
            .map_err(|e| DataStorageError::database("health_check_read", e.to_string()))?;

        read_txn
            .open_table(METADATA_TABLE)
            .map_err(|e| DataStorageError::database("health_check_table", e.to_string()))?;

        Ok(())
    }

    fn record_metric(&self, operation: &str, duration: Duration, records_written: u64, success: bool) {
        let metric = StorageMetrics {
            operation: operation.to_string(),
            duration_us: u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
            records_written,
            success,
            timestamp: Utc::now(),
        };

        let mut metrics = self.metrics.lock();
        metrics.push(metric);

        // Keep only the most recent metrics
        if metrics.len() > METRICS_CAPACITY {
            metrics.drain(0..METRICS_CAPACITY / 2);
        }
    }
}

impl Store for RedbStore {
    type Transaction<'a> = RedbTransaction<'a>;

    fn begin(&self) -> StoreResult<Self::Transaction<'_>> {
        let txn = self.database.begin_write().map_err(backend("begin_write"))?;
        Ok(RedbTransaction {
            txn,
            store: self,
            started: Instant::now(),
            records_written: 0,
        })
    }
}

/// Transaction handle of a [`RedbStore`]
pub struct RedbTransaction<'a> {
    txn: WriteTransaction<'a>,
    store: &'a RedbStore,
    started: Instant,
    records_written: u64,
}

impl RedbTransaction<'_> {
    fn get_entity<T: DeserializeOwned>(
        &self,
        definition: EntityTable,
        key: u64,
        operation: &'static str,
    ) -> StoreResult<Option<T>> {
        let table = self.txn.open_table(definition).map_err(backend(operation))?;
        let record = match table.get(key).map_err(backend(operation))? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(record)
    }

    fn list_entities<T: DeserializeOwned>(
        &self,
        definition: EntityTable,
        operation: &'static str,
    ) -> StoreResult<Vec<T>> {
        let table = self.txn.open_table(definition).map_err(backend(operation))?;
        let mut records = Vec::new();
        for item in table.iter().map_err(backend(operation))? {
            let (_, value) = item.map_err(backend(operation))?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    fn put_entity<T: Serialize>(
        &mut self,
        definition: EntityTable,
        key: u64,
        record: &T,
        operation: &'static str,
    ) -> StoreResult<()> {
        let bytes = serde_json::to_vec(record)?;
        {
            let mut table = self.txn.open_table(definition).map_err(backend(operation))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(backend(operation))?;
        }
        self.records_written += 1;
        Ok(())
    }

    #[allow(clippy::let_and_return)] // The removed guard must drop before the table
    fn delete_entity(
        &mut self,
        definition: EntityTable,
        key: u64,
        operation: &'static str,
    ) -> StoreResult<bool> {
        let removed = {
            let mut table = self.txn.open_table(definition).map_err(backend(operation))?;
            let removed = table.remove(key).map_err(backend(operation))?.is_some();
            removed
        };
        if removed {
            self.records_written += 1;
        }
        Ok(removed)
    }
}

impl StoreTransaction for RedbTransaction<'_> {
    fn load_ram(&self) -> StoreResult<Option<RamNode>> {
        let table = self
            .txn
            .open_table(METADATA_TABLE)
            .map_err(backend("load_ram"))?;
        let ram = match table.get(RAM_KEY).map_err(backend("load_ram"))? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(ram)
    }

    fn save_ram(&mut self, ram: &RamNode) -> StoreResult<()> {
        let bytes = serde_json::to_vec(ram)?;
        {
            let mut table = self
                .txn
                .open_table(METADATA_TABLE)
                .map_err(backend("save_ram"))?;
            table
                .insert(RAM_KEY, bytes.as_slice())
                .map_err(backend("save_ram"))?;
        }
        self.records_written += 1;
        Ok(())
    }

    fn next_id(&mut self, kind: EntityKind) -> StoreResult<u64> {
        let mut table = self
            .txn
            .open_table(SEQUENCES_TABLE)
            .map_err(backend("next_id"))?;
        let current = table
            .get(kind.as_str())
            .map_err(backend("next_id"))?
            .map_or(0, |value| value.value());
        let next = current + 1;
        table
            .insert(kind.as_str(), next)
            .map_err(backend("next_id"))?;
        Ok(next)
    }

    fn arenas(&self) -> StoreResult<Vec<ArenaNode>> {
        self.list_entities(ARENAS_TABLE, "list_arenas")
    }

    fn arena(&self, id: ArenaId) -> StoreResult<Option<ArenaNode>> {
        self.get_entity(ARENAS_TABLE, id.get(), "get_arena")
    }

    fn save_arena(&mut self, arena: &ArenaNode) -> StoreResult<()> {
        self.put_entity(ARENAS_TABLE, arena.id.get(), arena, "save_arena")
    }

    fn delete_arena(&mut self, id: ArenaId) -> StoreResult<()> {
        self.delete_entity(ARENAS_TABLE, id.get(), "delete_arena")
            .map(drop)
    }

    fn pools(&self) -> StoreResult<Vec<PoolNode>> {
        self.list_entities(POOLS_TABLE, "list_pools")
    }

    fn pool(&self, id: PoolId) -> StoreResult<Option<PoolNode>> {
        self.get_entity(POOLS_TABLE, id.get(), "get_pool")
    }

    fn save_pool(&mut self, pool: &PoolNode) -> StoreResult<()> {
        self.put_entity(POOLS_TABLE, pool.id.get(), pool, "save_pool")
    }

    fn delete_pool(&mut self, id: PoolId) -> StoreResult<()> {
        self.delete_entity(POOLS_TABLE, id.get(), "delete_pool")
            .map(drop)
    }

    fn blocks(&self) -> StoreResult<Vec<BlockNode>> {
        self.list_entities(BLOCKS_TABLE, "list_blocks")
    }

    fn block(&self, id: BlockId) -> StoreResult<Option<BlockNode>> {
        self.get_entity(BLOCKS_TABLE, id.get(), "get_block")
    }

    fn save_block(&mut self, block: &BlockNode) -> StoreResult<()> {
        self.put_entity(BLOCKS_TABLE, block.id.get(), block, "save_block")
    }

    fn delete_block(&mut self, id: BlockId) -> StoreResult<()> {
        self.delete_entity(BLOCKS_TABLE, id.get(), "delete_block")
            .map(drop)
    }

    fn object(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let table = self
            .txn
            .open_table(OBJECTS_TABLE)
            .map_err(backend("get_object"))?;
        let record = match table.get(id.as_str()).map_err(backend("get_object"))? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(record)
    }

    fn save_object(&mut self, object: &StoredObject) -> StoreResult<()> {
        let bytes = serde_json::to_vec(object)?;
        {
            let mut table = self
                .txn
                .open_table(OBJECTS_TABLE)
                .map_err(backend("save_object"))?;
            table
                .insert(object.object_id.as_str(), bytes.as_slice())
                .map_err(backend("save_object"))?;
        }
        self.records_written += 1;
        Ok(())
    }

    fn delete_object(&mut self, id: &ObjectId) -> StoreResult<()> {
        {
            let mut table = self
                .txn
                .open_table(OBJECTS_TABLE)
                .map_err(backend("delete_object"))?;
            table
                .remove(id.as_str())
                .map_err(backend("delete_object"))?;
        }
        self.records_written += 1;
        Ok(())
    }

    fn object_count(&self) -> StoreResult<u64> {
        let table = self
            .txn
            .open_table(OBJECTS_TABLE)
            .map_err(backend("object_count"))?;
        table.len().map_err(backend("object_count"))
    }

    fn ledger(&self) -> StoreResult<Vec<LedgerEntry>> {
        self.list_entities(LEDGER_TABLE, "list_ledger")
    }

    fn save_ledger_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        self.put_entity(LEDGER_TABLE, entry.id.get(), entry, "save_ledger_entry")
    }

    fn delete_ledger_of(&mut self, id: &ObjectId) -> StoreResult<usize> {
        let mut removed = 0;
        for entry in self.ledger_of(id)? {
            if self.delete_entity(LEDGER_TABLE, entry.id.get(), "delete_ledger_entry")? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn commit(self) -> StoreResult<()> {
        let result = self.txn.commit().map_err(backend("commit"));
        let duration = self.started.elapsed();
        self.store
            .record_metric("commit", duration, self.records_written, result.is_ok());
        if duration > SLOW_COMMIT {
            tracing::warn!(
                records = self.records_written,
                "Redb store commit exceeded 1ms: {:?}",
                duration
            );
        }
        result
    }

    fn rollback(self) -> StoreResult<()> {
        let result = self.txn.abort().map_err(backend("rollback"));
        self.store.record_metric(
            "rollback",
            self.started.elapsed(),
            self.records_written,
            result.is_ok(),
        );
        result
    }
}
