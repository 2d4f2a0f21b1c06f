//! Allocator metrics
//!
//! Counters and gauges published through the `metrics` facade when the
//! `metrics` feature is enabled. Without it every recorder is a no-op, so
//! call sites never need their own `cfg`.
//!
//! Names are dot-separated; exporters rewrite them as needed.

use crate::memory::{Allocation, GcReport, MemoryStats, Release};

/// Objects placed in the hierarchy
pub const ALLOCATIONS_TOTAL: &str = "tiermem.allocations.total";
/// Allocations answered by an existing record
pub const DEDUPLICATIONS_TOTAL: &str = "tiermem.deduplications.total";
/// Ledger entries written
pub const FRAGMENTS_TOTAL: &str = "tiermem.fragments.total";
/// Objects freed
pub const FREES_TOTAL: &str = "tiermem.frees.total";
/// Nodes removed by garbage collection
pub const GC_REMOVED_TOTAL: &str = "tiermem.gc.removed.total";
/// Operations rolled back
pub const ROLLBACKS_TOTAL: &str = "tiermem.rollbacks.total";
/// Bytes in use across Ram
pub const USED_BYTES: &str = "tiermem.used.bytes";
/// Blocks in the hierarchy
pub const BLOCKS: &str = "tiermem.blocks";

/// Record a successful allocation
#[cfg(feature = "metrics")]
pub fn record_allocation(allocation: &Allocation) {
    if allocation.deduplicated {
        metrics::counter!(DEDUPLICATIONS_TOTAL).increment(1);
    } else {
        metrics::counter!(ALLOCATIONS_TOTAL).increment(1);
        metrics::counter!(FRAGMENTS_TOTAL).increment(allocation.fragments as u64);
    }
}

/// Record a successful allocation
#[cfg(not(feature = "metrics"))]
pub const fn record_allocation(_allocation: &Allocation) {}

/// Record a successful free
#[cfg(feature = "metrics")]
pub fn record_release(_release: &Release) {
    metrics::counter!(FREES_TOTAL).increment(1);
}

/// Record a successful free
#[cfg(not(feature = "metrics"))]
pub const fn record_release(_release: &Release) {}

/// Record a garbage-collection pass
#[cfg(feature = "metrics")]
pub fn record_gc(report: &GcReport) {
    metrics::counter!(GC_REMOVED_TOTAL, "kind" => "block").increment(report.blocks_removed);
    metrics::counter!(GC_REMOVED_TOTAL, "kind" => "pool").increment(report.pools_removed);
    metrics::counter!(GC_REMOVED_TOTAL, "kind" => "arena").increment(report.arenas_removed);
}

/// Record a garbage-collection pass
#[cfg(not(feature = "metrics"))]
pub const fn record_gc(_report: &GcReport) {}

/// Record a rolled back operation
#[cfg(feature = "metrics")]
pub fn record_rollback(operation: &'static str) {
    metrics::counter!(ROLLBACKS_TOTAL, "operation" => operation).increment(1);
}

/// Record a rolled back operation
#[cfg(not(feature = "metrics"))]
pub const fn record_rollback(_operation: &'static str) {}

/// Publish gauges from a snapshot
#[cfg(feature = "metrics")]
#[allow(clippy::cast_precision_loss)]
pub fn record_stats(stats: &MemoryStats) {
    metrics::gauge!(USED_BYTES).set(stats.used_bytes as f64);
    metrics::gauge!(BLOCKS).set(stats.block_count as f64);
}

/// Publish gauges from a snapshot
#[cfg(not(feature = "metrics"))]
pub const fn record_stats(_stats: &MemoryStats) {}
