//! Integration tests for `TierMem` Data Storage
//!
//! Runs the allocator over the redb store: the reference scenario, rollback
//! of failed operations, and persistence across reopen.

#![allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
#![allow(clippy::expect_used)] // Tests are allowed to use expect for simplicity

use tempfile::TempDir;

use tiermem_core::{AllocatorConfig, AllocatorError, Object};
use tiermem_data_storage::{open_manager, DataStorageError, RedbStore, RedbStoreConfig};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn sized(identifier: &str, size: u64) -> Object {
    Object::with_identity(identifier, size, Vec::new())
}

#[test]
fn test_reference_scenario_over_redb() -> TestResult<()> {
    init_tracing();
    let manager = open_manager(&RedbStoreConfig::in_memory(), AllocatorConfig::test()?)?;

    let a = sized("A", 120);
    manager.allocate(&a)?;
    let sizes: Vec<u64> = manager
        .fragments_of(a.id())?
        .iter()
        .map(|entry| entry.allocated_bytes)
        .collect();
    assert_eq!(sizes, vec![50, 50, 20]);

    let stats = manager.stats()?;
    assert_eq!((stats.arena_count, stats.pool_count, stats.block_count), (1, 1, 3));
    assert_eq!(stats.used_bytes, 120);

    manager.free(a.id())?;
    assert_eq!(manager.stats()?.used_bytes, 0);

    let report = manager.garbage_collect()?;
    assert_eq!(report.total(), 5);
    assert_eq!(manager.stats()?.block_count, 0);
    manager.verify_integrity()?;
    Ok(())
}

#[test]
fn test_dedup_and_payload_over_redb() -> TestResult<()> {
    init_tracing();
    let manager = open_manager(&RedbStoreConfig::in_memory(), AllocatorConfig::test()?)?;

    let object = Object::from_bytes(b"Test Object 1".to_vec());
    let first = manager.allocate(&object)?;
    let second = manager.allocate_detailed(&Object::from_bytes(b"Test Object 1".to_vec()))?;

    assert_eq!(first, second.object_id);
    assert!(second.deduplicated);
    let record = manager.get(&first)?.expect("record stored");
    assert_eq!(record.payload, b"Test Object 1");
    assert_eq!(manager.stats()?.used_bytes, 13);
    Ok(())
}

#[test]
fn test_failed_allocation_aborts_redb_transaction() -> TestResult<()> {
    init_tracing();
    let manager = open_manager(&RedbStoreConfig::in_memory(), AllocatorConfig::test()?)?;
    manager.allocate(&sized("bulk", 950))?;
    let before = manager.stats()?;

    let result = manager.allocate(&sized("overflow", 100));
    assert!(matches!(result, Err(AllocatorError::RamExhausted { .. })));
    assert_eq!(manager.stats()?, before);
    manager.verify_integrity()?;

    let metrics = manager.store().metrics();
    assert!(metrics.iter().any(|metric| metric.operation == "rollback"));
    assert!(metrics.iter().any(|metric| metric.operation == "commit" && metric.success));
    Ok(())
}

#[test]
fn test_state_survives_reopen() -> TestResult<()> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let config = RedbStoreConfig::at_path(temp_dir.path().join("nested").join("tiermem.redb"));

    let kept = sized("kept", 130);
    let dropped = sized("dropped", 40);
    {
        let manager = open_manager(&config, AllocatorConfig::test()?)?;
        manager.allocate(&kept)?;
        manager.allocate(&dropped)?;
        manager.free(dropped.id())?;
    }

    let manager = open_manager(&config, AllocatorConfig::test()?)?;
    assert!(manager.is_stored(kept.id())?);
    assert!(!manager.is_stored(dropped.id())?);
    assert_eq!(manager.fragments_of(kept.id())?.len(), 3);

    let stats = manager.stats()?;
    assert_eq!(stats.used_bytes, 130);
    assert_eq!(stats.object_count, 1);
    manager.verify_integrity()?;

    // Sequences resume, so new ids never collide with persisted ones.
    let next = sized("next", 60);
    manager.allocate(&next)?;
    let mut ids: Vec<u64> = manager
        .fragments_of(kept.id())?
        .iter()
        .chain(manager.fragments_of(next.id())?.iter())
        .map(|entry| entry.id.get())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 6, 7]);
    manager.verify_integrity()?;
    Ok(())
}

#[test]
fn test_reopen_with_different_ram_capacity_fails() -> TestResult<()> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let config = RedbStoreConfig::at_path(temp_dir.path().join("tiermem.redb"));

    drop(open_manager(&config, AllocatorConfig::test()?)?);

    let result = open_manager(&config, AllocatorConfig::new(2_000, 500, 200, 50)?);
    assert!(matches!(
        result,
        Err(DataStorageError::Allocator(AllocatorError::Configuration { .. }))
    ));
    Ok(())
}

#[test]
fn test_health_check() -> TestResult<()> {
    let store = RedbStore::in_memory()?;
    store.health_check()?;
    Ok(())
}
