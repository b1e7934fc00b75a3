//! Core traits: the read contract every backend implements and the
//! builder contract every encoder implements.

use crate::cursor::ByteSink;
use crate::error::{IndexError, Result};
use crate::index::Encoding;

/// Read access to a strictly increasing sequence of IDs.
///
/// Positions are `0..size()`. Anything else is [`IndexError::OutOfBounds`].
pub trait IdSequence {
    /// Number of IDs.
    fn size(&self) -> usize;

    /// ID at position `pos`.
    fn at(&self, pos: usize) -> Result<u32>;

    /// True if the sequence holds no IDs.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Smallest ID. Fails on an empty sequence.
    fn first(&self) -> Result<u32> {
        self.at(0)
    }

    /// Largest ID. Fails on an empty sequence.
    fn last(&self) -> Result<u32> {
        match self.size() {
            0 => Err(IndexError::OutOfBounds { pos: 0, size: 0 }),
            n => self.at(n - 1),
        }
    }
}

/// Turns a sorted, duplicate-free ID slice into an encoded payload.
///
/// Implementations write only the backend payload; the container header
/// (version and encoding tag) is the caller's job.
pub trait IndexEncoder {
    /// Encoding this encoder produces.
    fn encoding(&self) -> Encoding;

    /// Encode `ids` into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidInput`] if `ids` is not strictly increasing.
    fn encode_payload(&self, ids: &[u32], sink: &mut ByteSink) -> Result<()>;

    /// Rough encoded size in bytes, used to preallocate buffers.
    fn estimate_size(&self, num_ids: usize) -> usize {
        num_ids * 4 + 16
    }
}

/// Check that IDs are sorted and unique.
pub(crate) fn validate_ids(ids: &[u32]) -> Result<()> {
    for pair in ids.windows(2) {
        if pair[1] <= pair[0] {
            return Err(IndexError::InvalidInput(format!(
                "IDs must be sorted and unique, found {} <= {}",
                pair[1], pair[0]
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Squares(usize);

    impl IdSequence for Squares {
        fn size(&self) -> usize {
            self.0
        }

        fn at(&self, pos: usize) -> Result<u32> {
            if pos >= self.0 {
                return Err(IndexError::OutOfBounds { pos, size: self.0 });
            }
            Ok((pos * pos) as u32)
        }
    }

    #[test]
    fn test_default_accessors() {
        let seq = Squares(4);
        assert_eq!(seq.first().unwrap(), 0);
        assert_eq!(seq.last().unwrap(), 9);
        assert!(!seq.is_empty());

        let empty = Squares(0);
        assert!(empty.is_empty());
        assert_eq!(
            empty.last().unwrap_err(),
            IndexError::OutOfBounds { pos: 0, size: 0 }
        );
        assert!(empty.first().is_err());
    }

    #[test]
    fn test_validate_ids() {
        assert!(validate_ids(&[]).is_ok());
        assert!(validate_ids(&[7]).is_ok());
        assert!(validate_ids(&[1, 5, 10]).is_ok());
        assert!(validate_ids(&[5, 1, 10]).is_err());
        assert!(validate_ids(&[1, 5, 5, 10]).is_err());
    }
}
