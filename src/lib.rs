//! Compact sorted ID-set indexes.
//!
//! `sidx` stores sorted, duplicate-free sets of `u32` IDs in compact
//! immutable encodings and combines them with set algebra. This is the
//! shape of data behind most retrieval structures:
//!
//! - Inverted indexes (which items contain which terms)
//! - Spatial cell lists (which items intersect which cell)
//! - Result sets that need union/intersection with other result sets
//!
//! # Encodings
//!
//! - **Plain**: little-endian `u32`s, fully materialized
//! - **Frame-of-reference**: fixed-size blocks, each a reference value plus
//!   bit-packed deltas of a per-block width (1 to 32 bits); O(1) `at`
//! - **Huffman delta**: gaps coded with a canonical Huffman code built per
//!   index; forward iteration is the fast path, optional checkpoints bound
//!   the cost of `at`
//!
//! Every stored index starts with a format version and an encoding tag.
//! Unknown tags, version mismatches and malformed payloads are errors,
//! never best-effort decodes.
//!
//! # Set algebra
//!
//! Union, intersection, difference and symmetric difference are single-pass
//! sorted merges over the inputs' iterators, so any two encodings combine.
//! The result is encoded as the caller's [`BuildOptions`] ask.
//!
//! # Example
//!
//! ```rust
//! use sidx::{BuildOptions, Encoding, Index};
//!
//! let options = BuildOptions::new().with_encoding(Encoding::FrameOfReference);
//! let a = Index::build(vec![1, 2, 5, 9], &options).unwrap();
//! let b = Index::from_ids(vec![2, 4, 5]).unwrap();
//!
//! // Store and reopen
//! let bytes = a.to_bytes().unwrap();
//! let a = Index::from_bytes(bytes.into()).unwrap();
//! assert_eq!(a.at(2).unwrap(), 5);
//!
//! // Combine
//! assert_eq!(a.union(&b).unwrap().to_vec().unwrap(), vec![1, 2, 4, 5, 9]);
//! assert_eq!(a.difference(&b).unwrap().to_vec().unwrap(), vec![1, 9]);
//! ```
//!
//! # References
//!
//! - Goldstein, Ramakrishnan, Shaft (1998). "Compressing relations and indexes"
//! - Huffman, D. (1952). "A method for the construction of minimum-redundancy codes"
//! - Lemire, Boytsov (2015). "Decoding billions of integers per second through vectorization"

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod bits;
mod config;
pub mod cursor;
mod error;
pub mod huffman;
mod index;
mod lock;
pub mod registry;
pub mod set_ops;
mod traits;
pub mod unpack;

pub use config::{BuildOptions, DEFAULT_BLOCK_SIZE, DEFAULT_CHECKPOINT_INTERVAL, MAX_BLOCK_SIZE};
pub use cursor::{ByteCursor, ByteRange, ByteSink};
pub use error::{IndexError, Result};
pub use index::{write_index, Encoding, Index, IndexBuilder, Iter, FORMAT_VERSION};
pub use lock::{ReadGuard, SharedLock, WriteGuard};
pub use registry::{IndexFactory, IndexStore};
pub use traits::{IdSequence, IndexEncoder};
