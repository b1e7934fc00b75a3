//! Byte-level storage primitives.
//!
//! [`ByteRange`] is an immutable, cheaply clonable view over reference-counted
//! bytes. Indexes decoded from a `ByteRange` keep the underlying buffer alive,
//! so there is no way to observe a released source.
//!
//! [`ByteCursor`] reads fixed-width little-endian integers and varints from a
//! range, either at explicit offsets or at a resettable current position.
//! [`ByteSink`] is the write side, an append-only buffer with the same codecs.
//!
//! # Varint layout
//!
//! Unsigned integers are stored in groups of 7 payload bits, least
//! significant group first. Every byte except the last has its high
//! (continuation) bit set. A `u64` takes between 1 and 10 bytes.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{IndexError, Result};

/// Maximum encoded length of a `u64` varint.
pub const MAX_VAR_UINT_LEN: usize = 10;

/// Append `value` as a varint, returning the number of bytes written.
#[inline]
pub fn encode_var_uint(value: u64, buf: &mut Vec<u8>) -> usize {
    let mut val = value;
    let mut written = 1;
    while val >= 0x80 {
        buf.push((val as u8) | 0x80);
        val >>= 7;
        written += 1;
    }
    buf.push(val as u8);
    written
}

/// Decode a varint from the start of `buf`, returning `(value, bytes_consumed)`.
///
/// A buffer ending in the middle of a value is corrupt data, not end of stream.
#[inline]
pub fn decode_var_uint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;

    for (offset, &byte) in buf.iter().enumerate() {
        if offset == MAX_VAR_UINT_LEN - 1 && byte > 1 {
            return Err(IndexError::corrupt("varint overflows 64 bits"));
        }
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, offset + 1));
        }
        shift += 7;
    }

    Err(IndexError::corrupt("truncated varint"))
}

/// Number of bytes `encode_var_uint` would write for `value`.
#[inline]
pub fn var_uint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Immutable view over reference-counted bytes.
#[derive(Clone)]
pub struct ByteRange {
    data: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl ByteRange {
    /// Wrap a shared buffer, covering all of it.
    pub fn new(data: Arc<[u8]>) -> Self {
        let end = data.len();
        Self {
            data,
            start: 0,
            end,
        }
    }

    /// An empty range.
    pub fn empty() -> Self {
        Self::new(Arc::from(Vec::new()))
    }

    /// Number of bytes in the range.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if the range holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The bytes of this range.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Sub-range relative to this range's start, sharing the same buffer.
    pub fn slice(&self, range: Range<usize>) -> Result<ByteRange> {
        if range.start > range.end || range.end > self.len() {
            return Err(IndexError::corrupt(format!(
                "range {}..{} outside byte range of length {}",
                range.start,
                range.end,
                self.len()
            )));
        }
        Ok(ByteRange {
            data: Arc::clone(&self.data),
            start: self.start + range.start,
            end: self.start + range.end,
        })
    }

    /// Everything from `offset` to the end of this range.
    pub fn slice_from(&self, offset: usize) -> Result<ByteRange> {
        self.slice(offset..self.len())
    }
}

impl From<Vec<u8>> for ByteRange {
    fn from(bytes: Vec<u8>) -> Self {
        ByteRange::new(Arc::from(bytes))
    }
}

impl From<&[u8]> for ByteRange {
    fn from(bytes: &[u8]) -> Self {
        ByteRange::new(Arc::from(bytes))
    }
}

impl AsRef<[u8]> for ByteRange {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq for ByteRange {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteRange {}

impl fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteRange")
            .field("len", &self.len())
            .finish()
    }
}

/// Resettable read position over a [`ByteRange`].
#[derive(Clone, Debug)]
pub struct ByteCursor {
    data: ByteRange,
    pos: usize,
}

impl ByteCursor {
    /// Cursor positioned at the start of `data`.
    pub fn new(data: ByteRange) -> Self {
        Self { data, pos: 0 }
    }

    /// The range this cursor reads from.
    pub fn range(&self) -> &ByteRange {
        &self.data
    }

    /// Current read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current position.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Move the read position. Seeking to the end is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(IndexError::corrupt(format!(
                "seek to {} past end of {} bytes",
                pos,
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Rewind to the start.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    #[inline]
    fn bytes_at(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let bytes = self.data.as_slice();
        match offset.checked_add(len) {
            Some(end) if end <= bytes.len() => Ok(&bytes[offset..end]),
            _ => Err(IndexError::corrupt(format!(
                "read of {} bytes at offset {} past end of {} bytes",
                len,
                offset,
                bytes.len()
            ))),
        }
    }

    /// Byte at `offset`.
    pub fn get_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.bytes_at(offset, 1)?[0])
    }

    /// Little-endian `u16` at `offset`.
    pub fn get_u16(&self, offset: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.bytes_at(offset, 2)?))
    }

    /// Little-endian 24-bit unsigned at `offset`.
    pub fn get_u24(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u24(self.bytes_at(offset, 3)?))
    }

    /// Little-endian `u32` at `offset`.
    pub fn get_u32(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.bytes_at(offset, 4)?))
    }

    /// Little-endian `u64` at `offset`.
    pub fn get_u64(&self, offset: usize) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.bytes_at(offset, 8)?))
    }

    /// Varint at `offset`, returning `(value, bytes_consumed)`.
    pub fn get_var_uint(&self, offset: usize) -> Result<(u64, usize)> {
        let bytes = self.data.as_slice();
        if offset >= bytes.len() {
            return Err(IndexError::corrupt("truncated varint"));
        }
        decode_var_uint(&bytes[offset..])
    }

    /// Read a byte and advance.
    pub fn next_u8(&mut self) -> Result<u8> {
        let value = self.get_u8(self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    /// Read a little-endian `u32` and advance.
    pub fn next_u32(&mut self) -> Result<u32> {
        let value = self.get_u32(self.pos)?;
        self.pos += 4;
        Ok(value)
    }

    /// Read a little-endian `u64` and advance.
    pub fn next_u64(&mut self) -> Result<u64> {
        let value = self.get_u64(self.pos)?;
        self.pos += 8;
        Ok(value)
    }

    /// Read a varint and advance.
    pub fn next_var_uint(&mut self) -> Result<u64> {
        let (value, len) = self.get_var_uint(self.pos)?;
        self.pos += len;
        Ok(value)
    }

    /// Read a varint that must fit a `u32`.
    pub fn next_var_u32(&mut self) -> Result<u32> {
        let value = self.next_var_uint()?;
        u32::try_from(value)
            .map_err(|_| IndexError::corrupt(format!("varint {} exceeds u32", value)))
    }

    /// Read a varint used as a length or count.
    pub fn next_var_len(&mut self) -> Result<usize> {
        let value = self.next_var_uint()?;
        usize::try_from(value)
            .map_err(|_| IndexError::corrupt(format!("length {} exceeds usize", value)))
    }

    /// Take the next `len` bytes as a sub-range and advance past them.
    pub fn next_range(&mut self, len: usize) -> Result<ByteRange> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| IndexError::corrupt("length overflow"))?;
        let range = self.data.slice(self.pos..end)?;
        self.pos = end;
        Ok(range)
    }

    /// The rest of the range after the current position.
    pub fn rest(&self) -> Result<ByteRange> {
        self.data.slice_from(self.pos)
    }
}

/// Append-only byte buffer with the same codecs as [`ByteCursor`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteSink {
    buf: Vec<u8>,
}

impl ByteSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty sink with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Append one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append a little-endian `u16`.
    pub fn put_u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    /// Append a little-endian 24-bit unsigned. `value` must be below `2^24`.
    pub fn put_u24(&mut self, value: u32) -> Result<()> {
        if value >= 1 << 24 {
            return Err(IndexError::InvalidInput(format!(
                "{} does not fit in 24 bits",
                value
            )));
        }
        let mut bytes = [0u8; 3];
        LittleEndian::write_u24(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    /// Append a little-endian `u32`.
    pub fn put_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    /// Append a little-endian `u64`.
    pub fn put_u64(&mut self, value: u64) {
        let mut bytes = [0u8; 8];
        LittleEndian::write_u64(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    /// Overwrite a previously written little-endian `u32` at `offset`.
    pub fn set_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        let slot = offset
            .checked_add(4)
            .and_then(|end| self.buf.get_mut(offset..end));
        match slot {
            Some(slot) => {
                LittleEndian::write_u32(slot, value);
                Ok(())
            }
            None => Err(IndexError::InvalidInput(format!(
                "patch at {} past end of {} written bytes",
                offset,
                self.buf.len()
            ))),
        }
    }

    /// Append a varint, returning its encoded length.
    pub fn put_var_uint(&mut self, value: u64) -> usize {
        encode_var_uint(value, &mut self.buf)
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drop the contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Consume the sink, returning the written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    /// Consume the sink into a shareable range.
    pub fn into_range(self) -> ByteRange {
        ByteRange::from(self.buf)
    }
}
