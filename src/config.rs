//! Configuration for chunkstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a chunkstore database
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── LOCK             (advisory directory lock)
    ///     ├── index/           (key → location index)
    ///     └── chunks/          (one file per chunk, named by UUID)
    pub data_dir: PathBuf,

    /// Size in bytes of every newly created chunk.
    ///
    /// Required when creating a database. When opening, `None` adopts the
    /// stored size of the newest chunk on disk.
    pub chunk_size: Option<usize>,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Index WAL size (in bytes) that triggers a checkpoint
    pub index_checkpoint_bytes: u64,

    // -------------------------------------------------------------------------
    // Process Configuration
    // -------------------------------------------------------------------------
    /// Take an exclusive advisory lock on `data_dir` while open
    pub lock_directory: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./chunkstore_data"),
            chunk_size: None,
            index_checkpoint_bytes: 64 * 1024 * 1024, // 64 MB
            lock_directory: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the size of newly created chunks (in bytes)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = Some(size);
        self
    }

    /// Set the index WAL size that triggers a checkpoint (in bytes)
    pub fn index_checkpoint_bytes(mut self, bytes: u64) -> Self {
        self.config.index_checkpoint_bytes = bytes;
        self
    }

    /// Enable or disable the advisory directory lock
    pub fn lock_directory(mut self, enabled: bool) -> Self {
        self.config.lock_directory = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
