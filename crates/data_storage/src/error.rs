//! `TierMem` Data Storage Error System
//!
//! Errors raised while opening or configuring the persistent store. Once a
//! store is running, failures travel through the core's `StoreError`.

use thiserror::Error;
use tiermem_core::{AllocatorError, StoreError};

/// Data storage result type for all operations
pub type DataStorageResult<T> = Result<T, DataStorageError>;

/// Main error type for data storage operations
#[derive(Error, Debug)]
pub enum DataStorageError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Database operation errors
    #[error("Database operation failed: {operation} - {reason}")]
    Database {
        /// Operation that failed
        operation: String,
        /// Reason for failure
        reason: String,
    },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Allocator errors while attaching a manager
    #[error(transparent)]
    Allocator(#[from] AllocatorError),
}

impl DataStorageError {
    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create database error
    pub fn database(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration { .. } | Self::Serialization(_) => false,
            Self::Database { .. } | Self::Io(_) => true,
            Self::Allocator(err) => err.is_retryable(),
        }
    }
}

impl From<DataStorageError> for StoreError {
    fn from(err: DataStorageError) -> Self {
        match err {
            DataStorageError::Serialization(inner) => Self::Serialization(inner),
            DataStorageError::Database { operation, reason } => Self::Backend { operation, reason },
            other => Self::backend("data_storage", other),
        }
    }
}
