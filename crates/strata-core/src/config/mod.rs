mod defaults;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use defaults::*;

/// Average chunk sizes the gear chunker has precomputed mask pairs for.
pub const SUPPORTED_GEAR_SIZES: [u32; 3] = [4096, 8192, 16384];

/// Top-level store configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding recipes, categories, volumes, manifest, index.
    pub path: PathBuf,
    /// Number of versions to retain; ingesting beyond this triggers
    /// elimination of the oldest version.
    pub retention: u64,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
}

/// Chunking strategy selection. A closed set — strategies are picked once at
/// startup from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkerMethod {
    Gear,
    Rabin,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_chunker_method")]
    pub method: ChunkerMethod,
    /// Target average chunk size in bytes ("except size").
    #[serde(default = "default_except_size")]
    pub except_size: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            method: default_chunker_method(),
            except_size: default_except_size(),
        }
    }
}

impl ChunkerConfig {
    /// Minimum chunk size: a quarter of the average.
    pub fn min_size(&self) -> u32 {
        self.except_size / 4
    }

    /// Maximum chunk size: eight times the average.
    pub fn max_size(&self) -> u32 {
        self.except_size * 8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Per-category write buffer size during ingestion.
    #[serde(default = "default_write_buffer")]
    pub category_write: usize,
    /// Recipe header write buffer size.
    #[serde(default = "default_recipe_buffer")]
    pub recipe_write: usize,
    /// Read buffer for arrangement / restore record streaming.
    #[serde(default = "default_read_buffer")]
    pub record_read: usize,
    /// Write buffer for volume archiving.
    #[serde(default = "default_volume_buffer")]
    pub volume_write: usize,
    /// Data-sync only every Nth category buffer flush.
    #[serde(default = "default_sync_flush_interval")]
    pub sync_flush_interval: u64,
    /// Depth of the bounded channels between pipeline stages.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            category_write: default_write_buffer(),
            recipe_write: default_recipe_buffer(),
            record_read: default_read_buffer(),
            volume_write: default_volume_buffer(),
            sync_flush_interval: default_sync_flush_interval(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl StoreConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StrataError::FileNotFound(path.to_path_buf())
            } else {
                StrataError::Io(e)
            }
        })?;
        let config: StoreConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that would otherwise surface as corruption later.
    pub fn validate(&self) -> Result<()> {
        if self.retention == 0 {
            return Err(StrataError::Config("retention must be at least 1".into()));
        }
        if self.chunker.except_size == 0 {
            return Err(StrataError::Config("chunker.except_size must be non-zero".into()));
        }
        if self.chunker.method == ChunkerMethod::Gear
            && !SUPPORTED_GEAR_SIZES.contains(&self.chunker.except_size)
        {
            return Err(StrataError::Config(format!(
                "gear chunking supports average sizes {SUPPORTED_GEAR_SIZES:?}, got {}",
                self.chunker.except_size
            )));
        }
        if self.buffers.queue_depth == 0 {
            return Err(StrataError::Config("buffers.queue_depth must be non-zero".into()));
        }
        Ok(())
    }
}
