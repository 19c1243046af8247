//! Node-local configuration
//!
//! Only process concerns live here (storage paths, tuning, read-side
//! conveniences). Protocol tunables come from the on-chain hardfork schedule
//! and are deliberately absent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Chain node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Purge worker-request vote records when a request closes
    pub clear_old_worker_votes: bool,

    /// Verify the per-symbol conservation law after every block
    pub verify_conservation: bool,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/chain"),
            clear_old_worker_votes: true,
            verify_conservation: true,
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// RocksDB tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 128,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Load defaults overridden by environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CHAIN_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(v) = std::env::var("CHAIN_CLEAR_OLD_WORKER_VOTES") {
            config.clear_old_worker_votes = v == "1" || v.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.clear_old_worker_votes);
        assert!(config.verify_conservation);
        assert_eq!(config.rocksdb.write_buffer_size_mb, 128);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            data_dir = "/tmp/chain"
            clear_old_worker_votes = false
            verify_conservation = true

            [rocksdb]
            write_buffer_size_mb = 64
            max_write_buffer_number = 2
            max_background_jobs = 2
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/chain"));
        assert!(!config.clear_old_worker_votes);
        assert_eq!(config.rocksdb.write_buffer_size_mb, 64);
    }
}
