//! Fixed-width field unpackers.
//!
//! A packed run stores `count` unsigned fields of `width` bits each,
//! back to back, MSB-first, padded with zero bits to a whole byte. There is
//! one decoder per width in `1..=32`; each is a monomorphised copy of the
//! same routine, so the shift amounts and masks are compile-time constants
//! and the hot loop carries no per-field branching on the width.

use seq_macro::seq;

use crate::bits::BitWriter;
use crate::cursor::ByteSink;
use crate::error::{IndexError, Result};

/// Smallest supported field width.
pub const MIN_WIDTH: u32 = 1;
/// Largest supported field width.
pub const MAX_WIDTH: u32 = 32;

type FieldFn = fn(&[u8], usize) -> u32;

/// Extract field `index` of width `W`.
///
/// A field spans at most five bytes; they are loaded big-endian into a
/// 64-bit word so a single shift pair isolates the field.
#[inline(always)]
fn unpack_field<const W: u32>(data: &[u8], index: usize) -> u32 {
    let bit = index * W as usize;
    let byte = bit >> 3;
    let shift = (bit & 7) as u32;

    let mut word = [0u8; 8];
    let avail = data.len().saturating_sub(byte).min(8);
    if avail > 0 {
        word[..avail].copy_from_slice(&data[byte..byte + avail]);
    }
    let word = u64::from_be_bytes(word);

    ((word << shift) >> (64 - W)) as u32
}

static FIELD_FNS: [FieldFn; 32] = seq!(W in 1..=32 { [#(unpack_field::<W>,)*] });

/// Number of bytes a packed run of `count` fields of `width` bits occupies.
#[inline]
pub fn packed_len(width: u32, count: usize) -> usize {
    count.saturating_mul(width as usize).div_ceil(8)
}

/// Minimal width able to hold `max_value`, never below [`MIN_WIDTH`].
///
/// This is `ceil(log2(max_value + 1))`, with a zero maximum stored in one bit.
#[inline]
pub fn min_bit_width(max_value: u32) -> u32 {
    (32 - max_value.leading_zeros()).max(MIN_WIDTH)
}

/// Decoder for one field width.
#[derive(Clone, Copy)]
pub struct Unpacker {
    width: u32,
    field: FieldFn,
}

impl std::fmt::Debug for Unpacker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unpacker").field("width", &self.width).finish()
    }
}

/// Select the decoder for `width`.
///
/// Fails with [`IndexError::UnsupportedWidth`] outside `1..=32`.
pub fn unpacker(width: u32) -> Result<Unpacker> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
        return Err(IndexError::UnsupportedWidth(width));
    }
    Ok(Unpacker {
        width,
        field: FIELD_FNS[(width - 1) as usize],
    })
}

impl Unpacker {
    /// Field width in bits.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Field `index` of a packed run.
    ///
    /// `data` must hold at least `packed_len(width, index + 1)` bytes.
    #[inline]
    pub fn get(&self, data: &[u8], index: usize) -> u32 {
        debug_assert!(data.len() >= packed_len(self.width, index + 1));
        (self.field)(data, index)
    }

    /// Append the first `count` fields of a packed run to `out`.
    pub fn unpack_into(&self, data: &[u8], count: usize, out: &mut Vec<u32>) -> Result<()> {
        let needed = packed_len(self.width, count);
        if data.len() < needed {
            return Err(IndexError::corrupt(format!(
                "packed run of {} x {} bits needs {} bytes, have {}",
                count,
                self.width,
                needed,
                data.len()
            )));
        }
        out.reserve(count);
        out.extend((0..count).map(|i| (self.field)(data, i)));
        Ok(())
    }
}

/// Pack `values` as `width`-bit fields into `sink`, padding the last byte.
///
/// Every value must fit in `width` bits.
pub fn pack_fields(values: &[u32], width: u32, sink: &mut ByteSink) -> Result<()> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
        return Err(IndexError::UnsupportedWidth(width));
    }
    let mut writer = BitWriter::new(sink);
    for &value in values {
        if width < 32 && value >> width != 0 {
            return Err(IndexError::InvalidInput(format!(
                "value {} does not fit in {} bits",
                value, width
            )));
        }
        writer.push_bits(value as u64, width)?;
    }
    writer.flush();
    Ok(())
}
