use serde::{Deserialize, Serialize};

use crate::error::{Result, SaveError};

/// Edge length of the square map grid in classic files.
pub const LEGACY_GRID_SIZE: usize = 162;
pub const DEFAULT_GRID_SIZE: usize = 228;
pub const DEFAULT_COMPRESS_BUFFER_SIZE: usize = 3_000_000;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Encoder used for compressed chunks on save. Loads accept either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkCompression {
    /// PKWare DCL implode, what the game itself reads.
    #[default]
    Implode,
    Zlib,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Edge length of the current format's map grid.
    pub grid_size: usize,
    /// Capacity of the shared compression scratch buffer.
    pub compress_buffer_size: usize,
    pub compression: ChunkCompression,
    /// Only used by [`ChunkCompression::Zlib`].
    pub compression_level: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            compress_buffer_size: DEFAULT_COMPRESS_BUFFER_SIZE,
            compression: ChunkCompression::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl EngineConfig {
    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_size < LEGACY_GRID_SIZE {
            return Err(SaveError::InvalidConfig(format!(
                "grid_size {} is smaller than the legacy grid {}",
                self.grid_size, LEGACY_GRID_SIZE
            )));
        }
        if (self.grid_size - LEGACY_GRID_SIZE) % 2 != 0 {
            return Err(SaveError::InvalidConfig(format!(
                "grid_size {} cannot center a {}x{} legacy grid",
                self.grid_size, LEGACY_GRID_SIZE, LEGACY_GRID_SIZE
            )));
        }
        if self.compress_buffer_size == 0 || self.compress_buffer_size >= 0x8000_0000 {
            return Err(SaveError::InvalidConfig(format!(
                "compress_buffer_size {} must be in 1..2^31",
                self.compress_buffer_size
            )));
        }
        if self.compression_level > 9 {
            return Err(SaveError::InvalidConfig(format!(
                "compression_level {} must be in 0..=9",
                self.compression_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_uncenterable_grid() {
        let config = EngineConfig::default().with_grid_size(163);
        assert!(config.validate().is_err());
        let config = EngineConfig::default().with_grid_size(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_scratch_that_collides_with_sentinel() {
        let config = EngineConfig {
            compress_buffer_size: 0x8000_0000,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"grid_size": 262}"#).unwrap();
        assert_eq!(config.grid_size, 262);
        assert_eq!(config.compress_buffer_size, DEFAULT_COMPRESS_BUFFER_SIZE);
        assert_eq!(config.compression, ChunkCompression::Implode);
        assert!(serde_json::from_str::<EngineConfig>(r#"{"grid": 1}"#).is_err());
    }

    #[test]
    fn compression_is_named_in_lowercase() {
        let config: EngineConfig = serde_json::from_str(r#"{"compression": "zlib"}"#).unwrap();
        assert_eq!(config.compression, ChunkCompression::Zlib);
        assert!(serde_json::from_str::<EngineConfig>(r#"{"compression": "lzma"}"#).is_err());
    }
}
