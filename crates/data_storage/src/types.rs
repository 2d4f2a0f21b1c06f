//! `TierMem` Data Storage Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing of one finished store transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetrics {
    /// `commit` or `rollback`
    pub operation: String,

    /// Transaction duration in microseconds, begin to end
    pub duration_us: u64,

    /// Records written or deleted inside the transaction
    pub records_written: u64,

    /// Whether the transaction ended without error
    pub success: bool,

    /// Timestamp of operation
    pub timestamp: DateTime<Utc>,
}
