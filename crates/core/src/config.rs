//! `TierMem` Core Configuration System
//!
//! Tier sizing for the Ram → Arena → Pool → Block hierarchy, validated with
//! `garde` plus nesting rules. Loads from TOML, from a layered file/env source,
//! or from `TIERMEM_*` environment variables.

use crate::error::{AllocatorError, AllocatorResult};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Default Ram capacity: 16 GiB
pub const DEFAULT_RAM_CAPACITY: u64 = 17_179_869_184;
/// Default arena capacity: 256 KiB
pub const DEFAULT_ARENA_CAPACITY: u64 = 262_144;
/// Default pool capacity: 4 KiB
pub const DEFAULT_POOL_CAPACITY: u64 = 4_096;
/// Default block capacity: 512 B
pub const DEFAULT_BLOCK_CAPACITY: u64 = 512;

/// Prefix for layered environment overrides (`TIERMEM__TIERS__BLOCK_CAPACITY`)
const LAYERED_ENV_PREFIX: &str = "TIERMEM";

/// Core configuration for the allocator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, Default)]
pub struct AllocatorConfig {
    /// Capacity of every hierarchy tier
    #[garde(dive)]
    pub tiers: TierConfig,
}

/// Capacity of each tier, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TierConfig {
    /// Total Ram capacity
    #[garde(range(min = 1))]
    pub ram_capacity: u64,

    /// Capacity of one arena
    #[garde(range(min = 1))]
    pub arena_capacity: u64,

    /// Capacity of one pool
    #[garde(range(min = 1))]
    pub pool_capacity: u64,

    /// Capacity of one block
    #[garde(range(min = 1))]
    pub block_capacity: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            ram_capacity: DEFAULT_RAM_CAPACITY,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
        }
    }
}

impl AllocatorConfig {
    /// Create a validated configuration from explicit tier sizes
    ///
    /// # Errors
    ///
    /// Returns error if any capacity is zero or the tiers do not nest.
    pub fn new(
        ram_capacity: u64,
        arena_capacity: u64,
        pool_capacity: u64,
        block_capacity: u64,
    ) -> AllocatorResult<Self> {
        let config = Self {
            tiers: TierConfig {
                ram_capacity,
                arena_capacity,
                pool_capacity,
                block_capacity,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Small tiers used by tests and demos (Ram 1000, Arena 500, Pool 200, Block 50)
    ///
    /// # Errors
    ///
    /// Returns error if configuration validation fails.
    pub fn test() -> AllocatorResult<Self> {
        Self::new(1_000, 500, 200, 50)
    }

    /// Parse a TOML document
    ///
    /// ```toml
    /// [tiers]
    /// ram_capacity = 1000
    /// arena_capacity = 500
    /// pool_capacity = 200
    /// block_capacity = 50
    /// ```
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or validation fails.
    pub fn from_toml_str(source: &str) -> AllocatorResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| AllocatorError::config(format!("Invalid TOML configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file layered with `TIERMEM__`-prefixed environment variables
    ///
    /// Environment keys use `__` as separator, e.g.
    /// `TIERMEM__TIERS__BLOCK_CAPACITY=256`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, a value cannot be parsed
    /// or validation fails.
    pub fn load(path: &Path) -> AllocatorResult<Self> {
        let defaults = Self::default();
        let built = config::Config::builder()
            .set_default("tiers.ram_capacity", defaults.tiers.ram_capacity)
            .and_then(|b| b.set_default("tiers.arena_capacity", defaults.tiers.arena_capacity))
            .and_then(|b| b.set_default("tiers.pool_capacity", defaults.tiers.pool_capacity))
            .and_then(|b| b.set_default("tiers.block_capacity", defaults.tiers.block_capacity))
            .map_err(|e| AllocatorError::config(format!("Invalid defaults: {e}")))?
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(LAYERED_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                AllocatorError::config(format!(
                    "Failed to load configuration {}: {e}",
                    path.display()
                ))
            })?;

        let config: Self = built
            .try_deserialize()
            .map_err(|e| AllocatorError::config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `TIERMEM_RAM_CAPACITY`, `TIERMEM_ARENA_CAPACITY`,
    /// `TIERMEM_POOL_CAPACITY` and `TIERMEM_BLOCK_CAPACITY`
    ///
    /// # Errors
    ///
    /// Returns error if a variable is not an unsigned integer or validation fails.
    pub fn from_env() -> AllocatorResult<Self> {
        let defaults = TierConfig::default();
        let config = Self {
            tiers: TierConfig {
                ram_capacity: env_u64("TIERMEM_RAM_CAPACITY", defaults.ram_capacity)?,
                arena_capacity: env_u64("TIERMEM_ARENA_CAPACITY", defaults.arena_capacity)?,
                pool_capacity: env_u64("TIERMEM_POOL_CAPACITY", defaults.pool_capacity)?,
                block_capacity: env_u64("TIERMEM_BLOCK_CAPACITY", defaults.block_capacity)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration validation fails.
    pub fn validate(&self) -> AllocatorResult<()> {
        garde::Validate::validate(self, &())
            .map_err(|e| AllocatorError::validation("config", format!("Validation failed: {e}")))?;

        let tiers = &self.tiers;
        if tiers.block_capacity > tiers.pool_capacity {
            return Err(AllocatorError::validation(
                "block_capacity",
                "Block capacity cannot be larger than pool capacity",
            ));
        }
        if tiers.pool_capacity > tiers.arena_capacity {
            return Err(AllocatorError::validation(
                "pool_capacity",
                "Pool capacity cannot be larger than arena capacity",
            ));
        }
        if tiers.arena_capacity > tiers.ram_capacity {
            return Err(AllocatorError::validation(
                "arena_capacity",
                "Arena capacity cannot be larger than Ram capacity",
            ));
        }

        Ok(())
    }
}

fn env_u64(key: &str, default: u64) -> AllocatorResult<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AllocatorError::validation(key, format!("Expected an unsigned integer, got '{raw}'"))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => {
            Err(AllocatorError::validation(key, "Value is not valid unicode"))
        }
    }
}
