//! Engine tuning knobs.
//!
//! Defaults are small enough for tests; `EngineConfig::from_env` lets a host
//! process raise them without recompiling.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_BUCKET_CAPACITY: usize = 3;
pub const DEFAULT_MAX_GLOBAL_DEPTH: u32 = 20;
pub const DEFAULT_SORT_MEMORY_ROWS: usize = 10_000;
pub const DEFAULT_SORT_CHUNK_ROWS: usize = 1_000;

/// Hash directories deeper than this would address more slots than the
/// 32-bit key hash can distinguish.
const HASH_BITS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of entries held by one extendible-hash bucket.
    pub bucket_capacity: usize,
    /// Upper bound on the extendible-hash global depth.
    pub max_global_depth: u32,
    /// Sort-merge joins fall back to the external sort when a side has more rows than this.
    pub sort_memory_rows: usize,
    /// Number of entries written to each external-sort run.
    pub sort_chunk_rows: usize,
    /// Parent directory for external-sort run files; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            max_global_depth: DEFAULT_MAX_GLOBAL_DEPTH,
            sort_memory_rows: DEFAULT_SORT_MEMORY_ROWS,
            sort_chunk_rows: DEFAULT_SORT_CHUNK_ROWS,
            temp_dir: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `MINIREL_*` environment variables.
    pub fn from_env() -> EngineResult<Self> {
        let mut config = Self::default();
        if let Some(value) = env_parse::<usize>("MINIREL_BUCKET_CAPACITY")? {
            config.bucket_capacity = value;
        }
        if let Some(value) = env_parse::<u32>("MINIREL_MAX_GLOBAL_DEPTH")? {
            config.max_global_depth = value;
        }
        if let Some(value) = env_parse::<usize>("MINIREL_SORT_MEMORY_ROWS")? {
            config.sort_memory_rows = value;
        }
        if let Some(value) = env_parse::<usize>("MINIREL_SORT_CHUNK_ROWS")? {
            config.sort_chunk_rows = value;
        }
        if let Ok(dir) = std::env::var("MINIREL_TEMP_DIR") {
            if !dir.trim().is_empty() {
                config.temp_dir = Some(PathBuf::from(dir));
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_bucket_capacity(mut self, capacity: usize) -> Self {
        self.bucket_capacity = capacity;
        self
    }

    pub fn with_max_global_depth(mut self, depth: u32) -> Self {
        self.max_global_depth = depth;
        self
    }

    pub fn with_sort_memory_rows(mut self, rows: usize) -> Self {
        self.sort_memory_rows = rows;
        self
    }

    pub fn with_sort_chunk_rows(mut self, rows: usize) -> Self {
        self.sort_chunk_rows = rows;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.bucket_capacity == 0 {
            return Err(EngineError::schema("bucket_capacity must be at least 1"));
        }
        if self.max_global_depth == 0 || self.max_global_depth > HASH_BITS {
            return Err(EngineError::schema(format!(
                "max_global_depth must be between 1 and {}",
                HASH_BITS
            )));
        }
        if self.sort_chunk_rows == 0 {
            return Err(EngineError::schema("sort_chunk_rows must be at least 1"));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> EngineResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::schema(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bucket_capacity, 3);
        assert!(config.temp_dir.is_none());
    }

    #[test]
    fn rejects_zero_capacity_and_oversized_depth() {
        assert!(EngineConfig::default()
            .with_bucket_capacity(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_max_global_depth(33)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_sort_chunk_rows(0)
            .validate()
            .is_err());
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"bucket_capacity": 8}"#).unwrap();
        assert_eq!(config.bucket_capacity, 8);
        assert_eq!(config.sort_chunk_rows, DEFAULT_SORT_CHUNK_ROWS);
    }
}
