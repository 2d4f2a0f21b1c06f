//! `TierMem` Data Storage Configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default redb page cache size (128MB)
pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 134_217_728;

/// Redb store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedbStoreConfig {
    /// Database file path (None for in-memory)
    pub database_path: Option<PathBuf>,

    /// Use the in-memory backend instead of a file
    pub use_memory_storage: bool,

    /// Cache size in bytes
    pub cache_size_bytes: u64,
}

impl Default for RedbStoreConfig {
    fn default() -> Self {
        Self {
            database_path: Some(PathBuf::from("./data/hot/tiermem.redb")),
            use_memory_storage: false,
            cache_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
        }
    }
}

impl RedbStoreConfig {
    /// Volatile database, lost on drop
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            database_path: None,
            use_memory_storage: true,
            ..Self::default()
        }
    }

    /// File-backed database at `path`
    #[must_use]
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self {
            database_path: Some(path.as_ref().to_path_buf()),
            use_memory_storage: false,
            ..Self::default()
        }
    }

    /// Cache size as `usize`, saturating on 32-bit targets
    #[must_use]
    pub fn cache_size(&self) -> usize {
        usize::try_from(self.cache_size_bytes).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let memory = RedbStoreConfig::in_memory();
        assert!(memory.use_memory_storage);
        assert!(memory.database_path.is_none());

        let file = RedbStoreConfig::at_path("/tmp/tiermem.redb");
        assert!(!file.use_memory_storage);
        assert_eq!(file.database_path, Some(PathBuf::from("/tmp/tiermem.redb")));
        assert_eq!(file.cache_size_bytes, DEFAULT_CACHE_SIZE_BYTES);
    }
}
