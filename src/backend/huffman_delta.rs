//! Huffman-coded delta backend.
//!
//! IDs are stored as gaps (the first ID as its gap from 0), each gap written
//! with a canonical Huffman code built for this index.
//!
//! ```text
//! [count: varint][checkpoint_interval: varint]
//! [tree_len: varint][huffman table]
//! checkpoint_count x [bit_offset: u64 LE][previous id: u32 LE]
//! [stream_len: varint][code stream]
//! ```
//!
//! # Random access cost
//!
//! Without checkpoints (`checkpoint_interval == 0`) the stream can only be
//! read from the start, so `at(pos)` decodes `pos + 1` symbols: it is a
//! linear-time operation. With interval `K`, checkpoint `j` (for every
//! `j >= 1` with `j * K < count`) holds the bit offset of element `j * K`
//! and the value of element `j * K - 1`, bounding `at` to `K` symbols.
//! Iteration is always the efficient path.

use std::sync::Arc;

use crate::bits::{BitReader, BitWriter};
use crate::cursor::{ByteCursor, ByteRange, ByteSink};
use crate::error::{IndexError, Result};
use crate::huffman::{HuffmanCode, HuffmanDecoder};
use crate::index::Encoding;
use crate::traits::{validate_ids, IdSequence, IndexEncoder};

const CHECKPOINT_LEN: usize = 12;

/// Huffman-delta index over stored bytes.
#[derive(Clone, Debug)]
pub struct HuffmanIndex {
    count: usize,
    checkpoint_interval: usize,
    decoder: Arc<HuffmanDecoder>,
    checkpoints: ByteCursor,
    stream: ByteRange,
}

impl HuffmanIndex {
    /// Open a payload at the cursor, leaving the cursor after it.
    pub fn decode(cursor: &mut ByteCursor) -> Result<Self> {
        let count = cursor.next_var_len()?;
        let checkpoint_interval = cursor.next_var_len()?;

        let tree_len = cursor.next_var_len()?;
        let decoder = HuffmanDecoder::from_bytes(cursor.next_range(tree_len)?)?;
        if count > 0 && decoder.node_count() == 0 {
            return Err(IndexError::corrupt("huffman index has ids but no code table"));
        }

        let checkpoints_len = checkpoint_count(count, checkpoint_interval)
            .checked_mul(CHECKPOINT_LEN)
            .ok_or_else(|| IndexError::corrupt("huffman checkpoint table overflows"))?;
        let checkpoints = ByteCursor::new(cursor.next_range(checkpoints_len)?);

        let stream_len = cursor.next_var_len()?;
        let stream = cursor.next_range(stream_len)?;
        // every code is at least one bit
        if count > stream_len.saturating_mul(8) {
            return Err(IndexError::corrupt(format!(
                "huffman index claims {} ids in a {} byte stream",
                count, stream_len
            )));
        }

        Ok(Self {
            count,
            checkpoint_interval,
            decoder: Arc::new(decoder),
            checkpoints,
            stream,
        })
    }

    /// Distance between checkpoints, `0` when the stream has none.
    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    /// True if `at` can skip ahead instead of decoding from the start.
    pub fn has_checkpoints(&self) -> bool {
        checkpoint_count(self.count, self.checkpoint_interval) > 0
    }

    /// Forward iterator over the stream.
    pub fn iter(&self) -> HuffmanIter<'_> {
        HuffmanIter {
            decoder: &self.decoder,
            reader: BitReader::new(self.stream.clone()),
            acc: 0,
            pos: 0,
            count: self.count,
        }
    }
}

fn checkpoint_count(count: usize, interval: usize) -> usize {
    if interval == 0 || count == 0 {
        0
    } else {
        (count - 1) / interval
    }
}

/// Decode the element at `pos`, given the value of element `pos - 1` in `acc`.
#[inline]
fn step(decoder: &HuffmanDecoder, reader: &mut BitReader, acc: &mut u32, pos: usize) -> Result<u32> {
    let before = *acc;
    let value = decoder.decode_delta(reader, acc)?;
    if pos > 0 && value == before {
        return Err(IndexError::corrupt(format!(
            "zero gap at position {} in huffman delta stream",
            pos
        )));
    }
    Ok(value)
}

impl IdSequence for HuffmanIndex {
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

        let mut reader = BitReader::new(self.stream.clone());
        let mut acc = 0u32;
        let mut start = 0usize;

        if self.checkpoint_interval > 0 {
            let checkpoint = pos / self.checkpoint_interval;
            if checkpoint > 0 {
                let offset = (checkpoint - 1) * CHECKPOINT_LEN;
                reader.seek(self.checkpoints.get_u64(offset)?)?;
                acc = self.checkpoints.get_u32(offset + 8)?;
                start = checkpoint * self.checkpoint_interval;
            }
        }

        let mut value = acc;
        for at in start..=pos {
            value = step(&self.decoder, &mut reader, &mut acc, at)?;
        }
        Ok(value)
    }
}

/// Iterator over a [`HuffmanIndex`].
pub struct HuffmanIter<'a> {
    decoder: &'a HuffmanDecoder,
    reader: BitReader,
    acc: u32,
    pos: usize,
    count: usize,
}

impl Iterator for HuffmanIter<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.count {
            return None;
        }
        match step(self.decoder, &mut self.reader, &mut self.acc, self.pos) {
            Ok(value) => {
                self.pos += 1;
                Some(Ok(value))
            }
            Err(err) => {
                self.pos = self.count;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.pos;
        (remaining, Some(remaining))
    }
}

/// Writes the Huffman-delta payload.
#[derive(Clone, Copy, Debug)]
pub struct HuffmanDeltaEncoder {
    checkpoint_interval: u32,
}

impl HuffmanDeltaEncoder {
    /// Encoder emitting a checkpoint every `checkpoint_interval` IDs (`0` = none).
    pub fn new(checkpoint_interval: u32) -> Self {
        Self {
            checkpoint_interval,
        }
    }
}

impl Default for HuffmanDeltaEncoder {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CHECKPOINT_INTERVAL)
    }
}

impl IndexEncoder for HuffmanDeltaEncoder {
    fn encoding(&self) -> Encoding {
        Encoding::HuffmanDelta
    }

    fn encode_payload(&self, ids: &[u32], sink: &mut ByteSink) -> Result<()> {
        validate_ids(ids)?;

        let gaps = ids
            .iter()
            .scan(0u32, |prev, &id| {
                let gap = id - *prev;
                *prev = id;
                Some(gap)
            })
            .collect::<Vec<u32>>();
        let code = HuffmanCode::from_symbols(gaps.iter().copied())?;

        let mut table = ByteSink::new();
        code.write_table(&mut table)?;

        let interval = self.checkpoint_interval as usize;
        let mut checkpoints = ByteSink::new();
        let mut stream = ByteSink::with_capacity(ids.len());
        let mut writer = BitWriter::new(&mut stream);
        for (i, &gap) in gaps.iter().enumerate() {
            if interval > 0 && i > 0 && i % interval == 0 {
                checkpoints.put_u64(writer.bit_position());
                checkpoints.put_u32(ids[i - 1]);
            }
            code.encode(gap, &mut writer)?;
        }
        let bits = writer.flush();

        sink.put_var_uint(ids.len() as u64);
        sink.put_var_uint(interval as u64);
        sink.put_var_uint(table.len() as u64);
        sink.put_bytes(table.as_slice());
        sink.put_bytes(checkpoints.as_slice());
        sink.put_var_uint(stream.len() as u64);
        sink.put_bytes(stream.as_slice());

        tracing::debug!(
            ids = ids.len(),
            symbols = code.len(),
            table_bytes = table.len(),
            checkpoints = checkpoints.len() / CHECKPOINT_LEN,
            stream_bits = bits,
            "encoded huffman delta index"
        );
        Ok(())
    }

    fn estimate_size(&self, num_ids: usize) -> usize {
        num_ids + 64
    }
}
