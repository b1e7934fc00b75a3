//! Encoding backends.
//!
//! Each backend implements [`IdSequence`](crate::IdSequence) over its own
//! layout and pairs with an [`IndexEncoder`](crate::IndexEncoder) producing
//! that layout:
//!
//! - [`plain`]: raw little-endian `u32`s, decoded eagerly into memory
//! - [`frame`]: frame-of-reference blocks of bit-packed deltas
//! - [`huffman_delta`]: Huffman-coded gaps with optional checkpoints

pub mod frame;
pub mod huffman_delta;
pub mod plain;

pub use frame::{ForEncoder, ForIndex, ForIter};
pub use huffman_delta::{HuffmanDeltaEncoder, HuffmanIndex, HuffmanIter};
pub use plain::{PlainEncoder, PlainIndex};
