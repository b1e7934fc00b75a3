//! Build options shared by encoders, builders and set algebra.

use crate::error::{IndexError, Result};
use crate::index::Encoding;

/// Default frame-of-reference block size.
pub const DEFAULT_BLOCK_SIZE: u32 = 128;

/// Default distance between Huffman stream checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 64;

/// Largest accepted frame-of-reference block size.
pub const MAX_BLOCK_SIZE: u32 = 1 << 16;

/// How new indexes are encoded.
///
/// # Example
///
/// ```rust
/// use sidx::{BuildOptions, Encoding};
///
/// let options = BuildOptions::new()
///     .with_encoding(Encoding::FrameOfReference)
///     .with_block_size(64);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BuildOptions {
    /// Target encoding.
    pub encoding: Encoding,
    /// IDs per frame-of-reference block.
    pub block_size: u32,
    /// IDs between Huffman checkpoints; `0` disables them.
    pub checkpoint_interval: u32,
}

impl BuildOptions {
    /// Plain encoding with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the frame-of-reference block size.
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the Huffman checkpoint interval (`0` = none).
    pub fn with_checkpoint_interval(mut self, interval: u32) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Reject parameter combinations no encoder accepts.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(IndexError::InvalidInput(format!(
                "block size {} outside 1..={}",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        Ok(())
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Plain,
            block_size: DEFAULT_BLOCK_SIZE,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BuildOptions::default();
        assert_eq!(options.encoding, Encoding::Plain);
        assert_eq!(options.block_size, 128);
        assert_eq!(options.checkpoint_interval, 64);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_block_size_bounds() {
        assert!(BuildOptions::new().with_block_size(0).validate().is_err());
        assert!(BuildOptions::new().with_block_size(1).validate().is_ok());
        assert!(BuildOptions::new()
            .with_block_size(MAX_BLOCK_SIZE + 1)
            .validate()
            .is_err());
    }
}
