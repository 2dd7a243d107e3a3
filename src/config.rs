//! Configuration for AtlasStore
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Main configuration for an AtlasStore instance
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the store files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {name}.idx       (directory of 16-byte allocation records)
    ///     └── {name}.dat       (block-addressed payloads)
    pub data_dir: PathBuf,

    /// Base name shared by the index and data files
    pub name: String,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: when to fsync the store files
    pub sync_mode: SyncMode,
}

/// File sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// fsync after every payload and record write (safest, slowest)
    Always,

    /// fsync only on close and compaction (fast, loses recent writes on crash)
    OnClose,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasstore_data"),
            name: "store".to_string(),
            sync_mode: SyncMode::Always,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Path of the index (directory) file
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.idx", self.name))
    }

    /// Path of the block data file
    pub fn data_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.dat", self.name))
    }

    /// Path of the compaction commit marker
    pub fn compact_marker_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.compact", self.name))
    }

    /// Check the config before any file is touched
    ///
    /// The base name must be a plain file name: non-empty, no separators.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(StoreError::Config("store name must not be empty".to_string()));
        }

        let as_path = Path::new(&self.name);
        if as_path.components().count() != 1 || as_path.file_name().is_none() {
            return Err(StoreError::Config(format!(
                "store name must be a plain file name, got {:?}",
                self.name
            )));
        }

        Ok(())
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the directory that holds the store files
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the base name of the `.idx`/`.dat` pair
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
