//! Uncompressed backend.
//!
//! Payload: `[count: varint][count x u32 LE]`. Decoding materializes every
//! ID, so `at` is a slice lookup. Used as the in-memory result of set
//! algebra and as the reference backend in tests.

use std::sync::Arc;

use crate::cursor::{ByteCursor, ByteSink};
use crate::error::{IndexError, Result};
use crate::index::Encoding;
use crate::traits::{validate_ids, IdSequence, IndexEncoder};

/// IDs held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlainIndex {
    ids: Arc<[u32]>,
}

impl PlainIndex {
    /// Wrap `ids` after checking they are sorted and unique.
    pub fn from_sorted(ids: Vec<u32>) -> Result<Self> {
        validate_ids(&ids)?;
        Ok(Self::from_sorted_unchecked(ids))
    }

    /// Wrap `ids` already known to be sorted and unique.
    pub(crate) fn from_sorted_unchecked(ids: Vec<u32>) -> Self {
        debug_assert!(validate_ids(&ids).is_ok());
        Self { ids: ids.into() }
    }

    /// Decode a payload at the cursor, leaving the cursor after it.
    pub fn decode(cursor: &mut ByteCursor) -> Result<Self> {
        let count = cursor.next_var_len()?;
        if count > cursor.remaining() / 4 {
            return Err(IndexError::corrupt(format!(
                "plain index claims {} ids in {} bytes",
                count,
                cursor.remaining()
            )));
        }

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = cursor.next_u32()?;
            if ids.last().is_some_and(|&prev| id <= prev) {
                return Err(IndexError::corrupt(format!(
                    "plain index is not strictly increasing at id {}",
                    id
                )));
            }
            ids.push(id);
        }
        Ok(Self { ids: ids.into() })
    }

    /// The IDs as a slice.
    pub fn as_slice(&self) -> &[u32] {
        &self.ids
    }
}

impl IdSequence for PlainIndex {
    fn size(&self) -> usize {
        self.ids.len()
    }

    fn at(&self, pos: usize) -> Result<u32> {
        self.ids.get(pos).copied().ok_or(IndexError::OutOfBounds {
            pos,
            size: self.ids.len(),
        })
    }
}

/// Writes the plain payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainEncoder;

impl IndexEncoder for PlainEncoder {
    fn encoding(&self) -> Encoding {
        Encoding::Plain
    }

    fn encode_payload(&self, ids: &[u32], sink: &mut ByteSink) -> Result<()> {
        validate_ids(ids)?;
        sink.put_var_uint(ids.len() as u64);
        for &id in ids {
            sink.put_u32(id);
        }
        Ok(())
    }

    fn estimate_size(&self, num_ids: usize) -> usize {
        num_ids * 4 + 10
    }
}
