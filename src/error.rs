//! Error types for index decoding, encoding and set algebra.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors surfaced by index operations.
///
/// Errors are reported where they are detected. Nothing in this crate
/// substitutes a default value for a failed decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Stored bytes are malformed: truncated varint, truncated block,
    /// offsets pointing outside the byte range, invalid code walk.
    #[error("corrupt index data: {context}")]
    Corrupt {
        /// What was being decoded when the problem was found.
        context: String,
    },

    /// The container header carries a format version this build does not read.
    #[error("index format version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this crate writes and reads.
        expected: u8,
        /// Version found in the stored header.
        found: u8,
    },

    /// `at(pos)` with `pos >= size()`.
    #[error("position {pos} out of bounds for index of size {size}")]
    OutOfBounds {
        /// Requested position.
        pos: usize,
        /// Element count of the index.
        size: usize,
    },

    /// Requested a fixed-width unpacker outside `1..=32`.
    #[error("unsupported bit width {0}, expected 1..=32")]
    UnsupportedWidth(u32),

    /// Encoding tag not known to this crate.
    #[error("unsupported encoding tag {0:#04x}")]
    UnsupportedEncoding(u8),

    /// Encoding is recognised but has no codec yet.
    #[error("not implemented: {0}")]
    Unimplemented(String),

    /// Caller supplied input violating a precondition (unsorted IDs, bad options).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl IndexError {
    /// Shorthand for a [`IndexError::Corrupt`] error.
    pub fn corrupt(context: impl Into<String>) -> Self {
        IndexError::Corrupt {
            context: context.into(),
        }
    }

    /// True for errors caused by malformed stored data.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            IndexError::Corrupt { .. } | IndexError::VersionMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_category() {
        assert!(IndexError::corrupt("varint").is_corrupt());
        assert!(IndexError::VersionMismatch {
            expected: 1,
            found: 7
        }
        .is_corrupt());
        assert!(!IndexError::OutOfBounds { pos: 3, size: 3 }.is_corrupt());
        assert!(!IndexError::UnsupportedWidth(33).is_corrupt());
    }

    #[test]
    fn test_messages() {
        let err = IndexError::OutOfBounds { pos: 5, size: 2 };
        assert_eq!(
            err.to_string(),
            "position 5 out of bounds for index of size 2"
        );
        assert_eq!(
            IndexError::UnsupportedEncoding(0x2a).to_string(),
            "unsupported encoding tag 0x2a"
        );
    }
}
