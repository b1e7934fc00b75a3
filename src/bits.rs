//! Bit-granular cursors.
//!
//! Bits are consumed and produced MSB-first: the first bit of a stream is the
//! high bit of its first byte. Neither cursor assumes byte alignment between
//! calls; each one is the sole owner of its bit offset.

use crate::cursor::{ByteRange, ByteSink};
use crate::error::{IndexError, Result};

/// Reads 1 to 64 bits at a time from a [`ByteRange`].
#[derive(Clone, Debug)]
pub struct BitReader {
    data: ByteRange,
    bit_pos: u64,
    bit_len: u64,
}

impl BitReader {
    /// Reader positioned at the first bit of `data`.
    pub fn new(data: ByteRange) -> Self {
        let bit_len = data.len() as u64 * 8;
        Self {
            data,
            bit_pos: 0,
            bit_len,
        }
    }

    /// Current bit offset from the start of the range.
    #[inline]
    pub fn position(&self) -> u64 {
        self.bit_pos
    }

    /// Bits left to read. Includes padding bits of the final byte.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.bit_len - self.bit_pos
    }

    /// True while at least one bit is left.
    #[inline]
    pub fn has_next(&self) -> bool {
        self.bit_pos < self.bit_len
    }

    /// Jump to an absolute bit offset.
    pub fn seek(&mut self, bit_pos: u64) -> Result<()> {
        if bit_pos > self.bit_len {
            return Err(IndexError::corrupt(format!(
                "bit offset {} past end of {} bits",
                bit_pos, self.bit_len
            )));
        }
        self.bit_pos = bit_pos;
        Ok(())
    }

    /// Read a single bit.
    #[inline]
    pub fn next_bit(&mut self) -> Result<u32> {
        if self.bit_pos >= self.bit_len {
            return Err(IndexError::corrupt("bit stream exhausted"));
        }
        let byte = self.data.as_slice()[(self.bit_pos >> 3) as usize];
        let shift = 7 - (self.bit_pos & 7) as u32;
        self.bit_pos += 1;
        Ok(((byte >> shift) & 1) as u32)
    }

    /// Read `n` bits (`1..=64`) as an unsigned value, first bit most significant.
    pub fn next_bits(&mut self, n: u32) -> Result<u64> {
        if n == 0 || n > 64 {
            return Err(IndexError::InvalidInput(format!(
                "cannot read {} bits at once, expected 1..=64",
                n
            )));
        }
        if self.remaining() < n as u64 {
            return Err(IndexError::corrupt(format!(
                "bit stream exhausted: need {} bits, have {}",
                n,
                self.remaining()
            )));
        }

        let bytes = self.data.as_slice();
        let mut value = 0u64;
        let mut needed = n;
        while needed > 0 {
            let byte = bytes[(self.bit_pos >> 3) as usize] as u32;
            let avail = 8 - (self.bit_pos & 7) as u32;
            let take = avail.min(needed);
            let chunk = (byte >> (avail - take)) & ((1u32 << take) - 1);
            value = (value << take) | chunk as u64;
            self.bit_pos += take as u64;
            needed -= take;
        }
        Ok(value)
    }
}

/// Writes bit fields into a [`ByteSink`], buffering the partial byte.
pub struct BitWriter<'a> {
    sink: &'a mut ByteSink,
    pending: u32,
    pending_bits: u32,
    bits_written: u64,
}

impl<'a> BitWriter<'a> {
    /// Writer appending to `sink`, starting on a fresh byte.
    pub fn new(sink: &'a mut ByteSink) -> Self {
        Self {
            sink,
            pending: 0,
            pending_bits: 0,
            bits_written: 0,
        }
    }

    /// Bits pushed since construction, including the unflushed partial byte.
    #[inline]
    pub fn bit_position(&self) -> u64 {
        self.bits_written
    }

    /// Append the low `n` bits of `value` (`n <= 64`), most significant first.
    pub fn push_bits(&mut self, value: u64, n: u32) -> Result<()> {
        if n > 64 {
            return Err(IndexError::InvalidInput(format!(
                "cannot push {} bits at once, expected 0..=64",
                n
            )));
        }

        let mut remaining = n;
        while remaining > 0 {
            let take = (8 - self.pending_bits).min(remaining);
            let chunk = (value >> (remaining - take)) & ((1u64 << take) - 1);
            self.pending = (self.pending << take) | chunk as u32;
            self.pending_bits += take;
            remaining -= take;
            if self.pending_bits == 8 {
                self.sink.put_u8(self.pending as u8);
                self.pending = 0;
                self.pending_bits = 0;
            }
        }
        self.bits_written += n as u64;
        Ok(())
    }

    /// Pad the partial byte with zero bits and write it.
    ///
    /// Returns the number of meaningful bits written in total.
    pub fn flush(mut self) -> u64 {
        if self.pending_bits > 0 {
            let padded = self.pending << (8 - self.pending_bits);
            self.sink.put_u8(padded as u8);
            self.pending = 0;
            self.pending_bits = 0;
        }
        self.bits_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first_layout() {
        let mut sink = ByteSink::new();
        let mut writer = BitWriter::new(&mut sink);
        writer.push_bits(0b101, 3).unwrap();
        writer.push_bits(0b1, 1).unwrap();
        writer.push_bits(0b11, 2).unwrap();
        assert_eq!(writer.flush(), 6);
        assert_eq!(sink.as_slice(), &[0b1011_1100]);
    }

    #[test]
    fn test_cross_byte_fields() {
        let fields: [(u64, u32); 6] = [
            (0x1FF, 9),
            (0, 1),
            (0xDEAD_BEEF, 32),
            (u64::MAX, 64),
            (5, 3),
            (0x1234_5678_9ABC, 48),
        ];

        let mut sink = ByteSink::new();
        let mut writer = BitWriter::new(&mut sink);
        for &(value, n) in &fields {
            writer.push_bits(value, n).unwrap();
        }
        let total = writer.flush();
        assert_eq!(total, 157);
        assert_eq!(sink.len(), 20);

        let mut reader = BitReader::new(sink.into_range());
        for &(value, n) in &fields {
            assert_eq!(reader.next_bits(n).unwrap(), value);
        }
        assert_eq!(reader.position(), 157);
        assert_eq!(reader.remaining(), 3);
        assert_eq!(reader.next_bits(3).unwrap(), 0);
        assert!(!reader.has_next());
    }

    #[test]
    fn test_push_masks_high_bits() {
        let mut sink = ByteSink::new();
        let mut writer = BitWriter::new(&mut sink);
        writer.push_bits(0xFF, 4).unwrap();
        writer.push_bits(0, 4).unwrap();
        writer.flush();
        assert_eq!(sink.as_slice(), &[0xF0]);
    }

    #[test]
    fn test_single_bits_and_seek() {
        let mut reader = BitReader::new(ByteRange::from(vec![0b1000_0001u8, 0b0100_0000]));
        assert_eq!(reader.next_bit().unwrap(), 1);
        reader.seek(7).unwrap();
        assert_eq!(reader.next_bit().unwrap(), 1);
        assert_eq!(reader.next_bit().unwrap(), 0);
        assert_eq!(reader.next_bit().unwrap(), 1);
        reader.seek(16).unwrap();
        assert!(reader.next_bit().unwrap_err().is_corrupt());
        assert!(reader.seek(17).is_err());
    }

    #[test]
    fn test_read_limits() {
        let mut reader = BitReader::new(ByteRange::from(vec![0u8; 2]));
        assert!(matches!(
            reader.next_bits(0),
            Err(IndexError::InvalidInput(_))
        ));
        assert!(matches!(
            reader.next_bits(65),
            Err(IndexError::InvalidInput(_))
        ));
        assert!(reader.next_bits(17).unwrap_err().is_corrupt());
        assert_eq!(reader.next_bits(16).unwrap(), 0);
    }
}
