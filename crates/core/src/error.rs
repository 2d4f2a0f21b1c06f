//! `TierMem` Core Error System
//!
//! Error taxonomy for the capacity hierarchy, the allocator and the ledger.
//! Every public operation returns `Result<T, AllocatorError>`; nothing panics.

use thiserror::Error;

use crate::types::NodeRef;

/// Core result type for all allocator operations
pub type AllocatorResult<T> = Result<T, AllocatorError>;

/// Result type for storage collaborator calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a storage collaborator
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend operation failed (connectivity, write failure, ...)
    #[error("Store operation failed: {operation} - {reason}")]
    Backend {
        /// Operation that failed
        operation: String,
        /// Reason for failure
        reason: String,
    },

    /// Record could not be encoded or decoded
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data is malformed
    #[error("Store data corrupted: {details}")]
    Corrupted {
        /// Corruption details
        details: String,
    },
}

impl StoreError {
    /// Create backend error
    pub fn backend(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create corruption error
    pub fn corrupted(details: impl Into<String>) -> Self {
        Self::Corrupted {
            details: details.into(),
        }
    }
}

/// Main error type for allocator operations
#[derive(Error, Debug)]
pub enum AllocatorError {
    /// A single node would exceed its maximum capacity
    #[error("Capacity exceeded on {node}: requested {requested} bytes, remaining {remaining} bytes")]
    CapacityExceeded {
        /// Node that would overflow
        node: NodeRef,
        /// Requested bytes
        requested: u64,
        /// Bytes still available on the node
        remaining: u64,
    },

    /// No room anywhere in Ram to grow the hierarchy
    #[error("Ram exhausted: no capacity left for a new arena ({requested} bytes still to place)")]
    RamExhausted {
        /// Bytes that could not be placed
        requested: u64,
    },

    /// Object larger than the total Ram capacity
    #[error("Insufficient memory: object of {requested} bytes exceeds Ram capacity of {capacity} bytes")]
    InsufficientMemory {
        /// Object size
        requested: u64,
        /// Total Ram capacity
        capacity: u64,
    },

    /// Freeing more than a node holds (ledger/counter corruption)
    #[error("Underflow on {node}: subtracting {requested} bytes from {used} used bytes")]
    Underflow {
        /// Node that would underflow
        node: NodeRef,
        /// Bytes to subtract
        requested: u64,
        /// Bytes currently used
        used: u64,
    },

    /// Free on an unknown object identity
    #[error("Object not found: {object_id}")]
    ObjectNotFound {
        /// Object identifier
        object_id: String,
    },

    /// Hierarchy node missing
    #[error("Node not found: {node}")]
    NodeNotFound {
        /// Missing node
        node: NodeRef,
    },

    /// Invariant violation detected in persisted state
    #[error("Corruption detected: {details}")]
    Corruption {
        /// Corruption details
        details: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Validation errors
    #[error("Validation failed for field '{field}': {reason}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Reason for validation failure
        reason: String,
    },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage collaborator errors, surfaced unchanged
    #[error(transparent)]
    Store(#[from] StoreError),
}

// Convenience constructors for common errors
impl AllocatorError {
    /// Create capacity exceeded error
    #[must_use]
    pub const fn capacity_exceeded(node: NodeRef, requested: u64, remaining: u64) -> Self {
        Self::CapacityExceeded {
            node,
            requested,
            remaining,
        }
    }

    /// Create underflow error
    #[must_use]
    pub const fn underflow(node: NodeRef, requested: u64, used: u64) -> Self {
        Self::Underflow {
            node,
            requested,
            used,
        }
    }

    /// Create object not found error
    pub fn object_not_found(object_id: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            object_id: object_id.into(),
        }
    }

    /// Create node not found error
    #[must_use]
    pub const fn node_not_found(node: NodeRef) -> Self {
        Self::NodeNotFound { node }
    }

    /// Create corruption error
    pub fn corruption(details: impl Into<String>) -> Self {
        Self::Corruption {
            details: details.into(),
        }
    }

    /// Create configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is a fatal invariant violation
    ///
    /// Underflow and corruption mean the ledger and the usage counters
    /// disagree; callers should stop mutating the hierarchy.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Underflow { .. } | Self::Corruption { .. } | Self::Store(StoreError::Corrupted { .. })
        )
    }

    /// Check if error is retryable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(StoreError::Backend { .. }))
    }

    /// Monitoring code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            Self::RamExhausted { .. } => ErrorCode::RamExhausted,
            Self::InsufficientMemory { .. } => ErrorCode::InsufficientMemory,
            Self::Underflow { .. } => ErrorCode::Underflow,
            Self::ObjectNotFound { .. } => ErrorCode::ObjectNotFound,
            Self::NodeNotFound { .. } => ErrorCode::NodeNotFound,
            Self::Corruption { .. } => ErrorCode::Corruption,
            Self::Configuration { .. } | Self::Validation { .. } => ErrorCode::Configuration,
            Self::Serialization(_) => ErrorCode::Serialization,
            Self::Store(_) => ErrorCode::Store,
        }
    }
}

/// Allocator error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Capacity errors (1000-1099)
    CapacityExceeded = 1001,
    /// No room left in Ram for growth
    RamExhausted = 1002,
    /// Object larger than Ram
    InsufficientMemory = 1003,

    /// Ledger errors (1100-1199)
    Underflow = 1101,
    /// Unknown object identity
    ObjectNotFound = 1102,
    /// Unknown hierarchy node
    NodeNotFound = 1103,
    /// Ledger and counters disagree
    Corruption = 1104,

    /// Setup errors (1200-1299)
    Configuration = 1201,
    /// Record encoding failure
    Serialization = 1202,

    /// Storage errors (1300-1399)
    Store = 1301,
}

impl ErrorCode {
    /// Get error code as u16
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get error category
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match *self as u16 {
            1000..=1099 => "capacity",
            1100..=1199 => "ledger",
            1200..=1299 => "setup",
            1300..=1399 => "store",
            _ => "unknown",
        }
    }
}
