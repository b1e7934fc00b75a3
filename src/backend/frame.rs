//! Frame-of-reference backend.
//!
//! IDs are cut into blocks of `block_size` (the last block may be shorter).
//! Each block stores its first ID as the reference and every ID as a delta
//! from that reference, bit-packed at the narrowest width covering the
//! block's largest delta.
//!
//! ```text
//! [count: varint][block_size: varint][blocks_len: varint]
//! block_count x [offset: u32 LE]          offsets relative to the first block
//! block_count x [width: u8][reference: varint][packed deltas]
//! ```
//!
//! A block of `n` IDs packs `ceil(n * width / 8)` bytes. The offset table
//! makes `at(pos)` O(1): one header read and one field unpack. All block
//! headers are validated when the index is opened, so a successfully opened
//! index only fails later on overflowing values.

use crate::cursor::{ByteCursor, ByteRange, ByteSink};
use crate::error::{IndexError, Result};
use crate::index::Encoding;
use crate::traits::{validate_ids, IdSequence, IndexEncoder};
use crate::unpack::{min_bit_width, pack_fields, packed_len, unpacker, Unpacker};

#[derive(Clone, Copy, Debug)]
struct BlockHeader {
    unpacker: Unpacker,
    reference: u32,
    data_start: usize,
    len: usize,
}

/// Frame-of-reference index over stored bytes.
#[derive(Clone, Debug)]
pub struct ForIndex {
    count: usize,
    block_size: usize,
    offsets: ByteCursor,
    blocks: ByteCursor,
}

impl ForIndex {
    /// Open a payload at the cursor, leaving the cursor after it.
    pub fn decode(cursor: &mut ByteCursor) -> Result<Self> {
        let count = cursor.next_var_len()?;
        let block_size = cursor.next_var_len()?;
        if count > 0 && block_size == 0 {
            return Err(IndexError::corrupt("frame-of-reference block size is zero"));
        }
        let blocks_len = cursor.next_var_len()?;

        let block_count = if count == 0 {
            0
        } else {
            count.div_ceil(block_size)
        };
        let offsets_len = block_count
            .checked_mul(4)
            .ok_or_else(|| IndexError::corrupt("frame-of-reference offset table overflows"))?;
        let offsets = ByteCursor::new(cursor.next_range(offsets_len)?);
        let blocks = ByteCursor::new(cursor.next_range(blocks_len)?);

        let index = Self {
            count,
            block_size,
            offsets,
            blocks,
        };
        let mut prev_last: Option<u32> = None;
        for block in 0..block_count {
            let header = index.header(block)?;
            let first = index.value(block, &header, 0)?;
            let last = index.value(block, &header, header.len - 1)?;
            if prev_last.is_some_and(|prev| first <= prev) || (header.len > 1 && last <= first) {
                return Err(IndexError::corrupt(format!(
                    "frame-of-reference block {} is out of order",
                    block
                )));
            }
            prev_last = Some(last);
        }
        Ok(index)
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            self.count.div_ceil(self.block_size)
        }
    }

    /// IDs per full block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Packed delta width of `block`.
    pub fn block_width(&self, block: usize) -> Result<u32> {
        Ok(self.header(block)?.unpacker.width())
    }

    fn header(&self, block: usize) -> Result<BlockHeader> {
        let offset = self.offsets.get_u32(block * 4)? as usize;
        let width = self.blocks.get_u8(offset)? as u32;
        let unpacker = unpacker(width).map_err(|_| {
            IndexError::corrupt(format!("block {} stores invalid width {}", block, width))
        })?;
        let (reference, ref_len) = self.blocks.get_var_uint(offset + 1)?;
        let reference = u32::try_from(reference).map_err(|_| {
            IndexError::corrupt(format!("block {} reference {} exceeds u32", block, reference))
        })?;

        let data_start = offset + 1 + ref_len;
        let len = self.block_size.min(self.count - block * self.block_size);
        let data_end = data_start.saturating_add(packed_len(width, len));
        if data_end > self.blocks.range().len() {
            return Err(IndexError::corrupt(format!(
                "block {} ends at {} past {} block bytes",
                block,
                data_end,
                self.blocks.range().len()
            )));
        }

        Ok(BlockHeader {
            unpacker,
            reference,
            data_start,
            len,
        })
    }

    fn packed(&self, header: &BlockHeader) -> &[u8] {
        let end = header.data_start + packed_len(header.unpacker.width(), header.len);
        &self.blocks.range().as_slice()[header.data_start..end]
    }

    /// Value `i` of `block`.
    fn value(&self, block: usize, header: &BlockHeader, i: usize) -> Result<u32> {
        let delta = header.unpacker.get(self.packed(header), i);
        header
            .reference
            .checked_add(delta)
            .ok_or_else(|| IndexError::corrupt(format!("block {} overflows u32", block)))
    }

    /// Decode all of `block` into `out`, replacing its contents.
    ///
    /// Block boundaries are checked when the index is opened; the order
    /// inside the block is checked here.
    fn decode_block(&self, block: usize, out: &mut Vec<u32>) -> Result<()> {
        let header = self.header(block)?;
        out.clear();
        header
            .unpacker
            .unpack_into(self.packed(&header), header.len, out)?;
        let mut prev: Option<u32> = None;
        for value in out.iter_mut() {
            *value = header
                .reference
                .checked_add(*value)
                .ok_or_else(|| IndexError::corrupt(format!("block {} overflows u32", block)))?;
            if prev.is_some_and(|p| *value <= p) {
                return Err(IndexError::corrupt(format!(
                    "frame-of-reference block {} is not strictly increasing at {}",
                    block, *value
                )));
            }
            prev = Some(*value);
        }
        Ok(())
    }

    /// Forward iterator decoding one block at a time.
    pub fn iter(&self) -> ForIter<'_> {
        ForIter {
            index: self,
            block: 0,
            buf: Vec::with_capacity(self.block_size.min(self.count)),
            buf_pos: 0,
            remaining: self.count,
        }
    }
}

impl IdSequence for ForIndex {
    fn size(&self) -> usize {
        self.count
    }

    fn at(&self, pos: usize) -> Result<u32> {
        if pos >= self.count {
            return Err(IndexError::OutOfBounds {
                pos,
                size: self.count,
            });
        }
        let block = pos / self.block_size;
        let header = self.header(block)?;
        self.value(block, &header, pos % self.block_size)
    }
}

/// Iterator over a [`ForIndex`].
pub struct ForIter<'a> {
    index: &'a ForIndex,
    block: usize,
    buf: Vec<u32>,
    buf_pos: usize,
    remaining: usize,
}

impl Iterator for ForIter<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        if self.buf_pos == self.buf.len() {
            if let Err(err) = self.index.decode_block(self.block, &mut self.buf) {
                self.remaining = 0;
                return Some(Err(err));
            }
            self.block += 1;
            self.buf_pos = 0;
        }
        let value = self.buf[self.buf_pos];
        self.buf_pos += 1;
        self.remaining -= 1;
        Some(Ok(value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Writes the frame-of-reference payload.
#[derive(Clone, Copy, Debug)]
pub struct ForEncoder {
    block_size: u32,
}

impl ForEncoder {
    /// Encoder cutting blocks of `block_size` IDs.
    pub fn new(block_size: u32) -> Result<Self> {
        if block_size == 0 {
            return Err(IndexError::InvalidInput(
                "frame-of-reference block size must be positive".into(),
            ));
        }
        Ok(Self { block_size })
    }
}

impl Default for ForEncoder {
    fn default() -> Self {
        Self {
            block_size: crate::config::DEFAULT_BLOCK_SIZE,
        }
    }
}

impl IndexEncoder for ForEncoder {
    fn encoding(&self) -> Encoding {
        Encoding::FrameOfReference
    }

    fn encode_payload(&self, ids: &[u32], sink: &mut ByteSink) -> Result<()> {
        validate_ids(ids)?;

        let mut blocks = ByteSink::with_capacity(self.estimate_size(ids.len()));
        let mut offsets = Vec::with_capacity(ids.len().div_ceil(self.block_size as usize));
        let mut deltas = Vec::with_capacity(self.block_size as usize);
        let mut widest = 0;

        for chunk in ids.chunks(self.block_size as usize) {
            let reference = chunk[0];
            let width = min_bit_width(chunk[chunk.len() - 1] - reference);
            widest = widest.max(width);

            let offset = u32::try_from(blocks.len()).map_err(|_| {
                IndexError::InvalidInput("frame-of-reference block data exceeds 4 GiB".into())
            })?;
            offsets.push(offset);

            deltas.clear();
            deltas.extend(chunk.iter().map(|&id| id - reference));
            blocks.put_u8(width as u8);
            blocks.put_var_uint(reference as u64);
            pack_fields(&deltas, width, &mut blocks)?;
        }

        sink.put_var_uint(ids.len() as u64);
        sink.put_var_uint(self.block_size as u64);
        sink.put_var_uint(blocks.len() as u64);
        for offset in &offsets {
            sink.put_u32(*offset);
        }
        sink.put_bytes(blocks.as_slice());

        tracing::debug!(
            ids = ids.len(),
            blocks = offsets.len(),
            block_size = self.block_size,
            widest,
            bytes = blocks.len(),
            "encoded frame-of-reference index"
        );
        Ok(())
    }

    fn estimate_size(&self, num_ids: usize) -> usize {
        num_ids * 2 + num_ids.div_ceil(self.block_size as usize) * 10 + 16
    }
}
