//! Decoder registry and index stores.
//!
//! The decoder registry maps container tags to constructor functions. It
//! is created on first use with the built-in backends, lives for the rest
//! of the process, and is only reached through [`decoder`],
//! [`register_decoder`] and [`registered_tags`].
//!
//! [`IndexFactory`] packs many indexes into one buffer, storing identical
//! encodings once. [`IndexStore`] reads that buffer back and caches decoded
//! indexes behind a [`SharedLock`].
//!
//! Store layout:
//!
//! ```text
//! [version: u8][count: varint][count x offset: u64 LE][index data]
//! ```
//!
//! Offsets are relative to the start of the index data; index `i` spans
//! `offset[i]..offset[i + 1]` (the last one runs to the end).

use std::collections::HashMap;
use std::sync::OnceLock;

use xxhash_rust::xxh3::xxh3_64;

use crate::config::BuildOptions;
use crate::cursor::{ByteCursor, ByteRange, ByteSink};
use crate::error::{IndexError, Result};
use crate::index::{write_index, Encoding, Index};
use crate::lock::SharedLock;

/// Builds an [`Index`] from the payload at the cursor (after the container
/// header), leaving the cursor after the payload.
pub type DecodeFn = fn(&mut ByteCursor) -> Result<Index>;

/// Store format version.
pub const STORE_VERSION: u8 = 1;

fn decoders() -> &'static SharedLock<HashMap<u8, DecodeFn>> {
    static DECODERS: OnceLock<SharedLock<HashMap<u8, DecodeFn>>> = OnceLock::new();
    DECODERS.get_or_init(|| {
        let mut map: HashMap<u8, DecodeFn> = HashMap::new();
        map.insert(Encoding::Plain.tag(), Index::decode_plain);
        map.insert(
            Encoding::FrameOfReference.tag(),
            Index::decode_frame_of_reference,
        );
        map.insert(Encoding::HuffmanDelta.tag(), Index::decode_huffman_delta);
        SharedLock::new(map)
    })
}

/// Decoder registered for `tag`.
pub fn decoder(tag: u8) -> Option<DecodeFn> {
    decoders().read().get(&tag).copied()
}

/// Register `decode` for `tag`, returning the decoder it replaces.
pub fn register_decoder(tag: u8, decode: DecodeFn) -> Option<DecodeFn> {
    let previous = decoders().write().insert(tag, decode);
    tracing::debug!(tag, replaced = previous.is_some(), "registered index decoder");
    previous
}

/// Every registered tag, ascending.
pub fn registered_tags() -> Vec<u8> {
    let mut tags: Vec<u8> = decoders().read().keys().copied().collect();
    tags.sort_unstable();
    tags
}

/// Accumulates encoded indexes into a single store buffer.
///
/// ```rust
/// use sidx::{BuildOptions, Encoding, IndexFactory, IndexStore};
///
/// let mut factory =
///     IndexFactory::new(BuildOptions::new().with_encoding(Encoding::FrameOfReference)).unwrap();
/// let a = factory.add_ids(&[1, 2, 3]).unwrap();
/// let b = factory.add_ids(&[10, 20]).unwrap();
/// assert_eq!(factory.add_ids(&[1, 2, 3]).unwrap(), a);
///
/// let store = IndexStore::from_bytes(factory.finish().into()).unwrap();
/// assert_eq!(store.len(), 2);
/// assert_eq!(store.get(b).unwrap().to_vec().unwrap(), vec![10, 20]);
/// ```
#[derive(Debug)]
pub struct IndexFactory {
    options: BuildOptions,
    data: ByteSink,
    spans: Vec<(usize, usize)>,
    by_hash: HashMap<u64, Vec<u32>>,
    hit_count: usize,
    scratch: ByteSink,
}

impl IndexFactory {
    /// Factory encoding new ID lists per `options`.
    pub fn new(options: BuildOptions) -> Result<Self> {
        options.validate()?;
        options.encoding.encoder(&options)?;
        Ok(Self {
            options,
            data: ByteSink::new(),
            spans: Vec::new(),
            by_hash: HashMap::new(),
            hit_count: 0,
            scratch: ByteSink::new(),
        })
    }

    /// Options new ID lists are encoded with.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Encode `ids` and add them, returning their id in the store.
    pub fn add_ids(&mut self, ids: &[u32]) -> Result<u32> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        write_index(ids, &self.options, &mut scratch)?;
        let id = self.add_encoded(scratch.as_slice());
        self.scratch = scratch;
        id
    }

    /// Add an index in its current stored form.
    pub fn add_index(&mut self, index: &Index) -> Result<u32> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        index.append(&mut scratch)?;
        let id = self.add_encoded(scratch.as_slice());
        self.scratch = scratch;
        id
    }

    fn add_encoded(&mut self, bytes: &[u8]) -> Result<u32> {
        let hash = xxh3_64(bytes);
        if let Some(candidates) = self.by_hash.get(&hash) {
            for &id in candidates {
                let (start, end) = self.spans[id as usize];
                if &self.data.as_slice()[start..end] == bytes {
                    self.hit_count += 1;
                    tracing::debug!(id, len = bytes.len(), "deduplicated index");
                    return Ok(id);
                }
            }
        }

        let id = u32::try_from(self.spans.len())
            .map_err(|_| IndexError::InvalidInput("index store is full".into()))?;
        let start = self.data.len();
        self.data.put_bytes(bytes);
        self.spans.push((start, self.data.len()));
        self.by_hash.entry(hash).or_default().push(id);
        Ok(id)
    }

    /// Distinct indexes stored.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Additions answered with an existing index.
    pub fn hit_count(&self) -> usize {
        self.hit_count
    }

    /// Bytes of index data accumulated.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Decode index `id` from the pending buffer.
    pub fn get(&self, id: u32) -> Result<Index> {
        let (start, end) = *self
            .spans
            .get(id as usize)
            .ok_or(IndexError::OutOfBounds {
                pos: id as usize,
                size: self.spans.len(),
            })?;
        Index::from_bytes(ByteRange::from(&self.data.as_slice()[start..end]))
    }

    /// Write the store: header, offset table, then the index data.
    pub fn finish(self) -> Vec<u8> {
        let mut out = ByteSink::with_capacity(1 + 10 + self.spans.len() * 8 + self.data.len());
        out.put_u8(STORE_VERSION);
        out.put_var_uint(self.spans.len() as u64);
        for &(start, _) in &self.spans {
            out.put_u64(start as u64);
        }
        out.put_bytes(self.data.as_slice());
        tracing::debug!(
            indexes = self.spans.len(),
            data_bytes = self.data.len(),
            dedup_hits = self.hit_count,
            "flushed index store"
        );
        out.into_vec()
    }
}

/// Read side of a store written by [`IndexFactory::finish`].
#[derive(Debug)]
pub struct IndexStore {
    count: usize,
    offsets: ByteCursor,
    data: ByteRange,
    cache: SharedLock<HashMap<u32, Index>>,
}

impl IndexStore {
    /// Open a store, validating its header and offset table.
    pub fn from_bytes(bytes: ByteRange) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let version = cursor.next_u8()?;
        if version != STORE_VERSION {
            return Err(IndexError::VersionMismatch {
                expected: STORE_VERSION,
                found: version,
            });
        }

        let count = cursor.next_var_len()?;
        let table_len = count
            .checked_mul(8)
            .ok_or_else(|| IndexError::corrupt(format!("store claims {} indexes", count)))?;
        let offsets = ByteCursor::new(cursor.next_range(table_len)?);
        let data = cursor.rest()?;

        let mut prev = 0u64;
        for i in 0..count {
            let offset = offsets.get_u64(i * 8)?;
            if offset < prev || offset > data.len() as u64 {
                return Err(IndexError::corrupt(format!(
                    "store offset {} of index {} outside {}..={}",
                    offset,
                    i,
                    prev,
                    data.len()
                )));
            }
            prev = offset;
        }

        Ok(Self {
            count,
            offsets,
            data,
            cache: SharedLock::default(),
        })
    }

    /// Number of indexes.
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if the store holds no indexes.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn span(&self, pos: usize) -> Result<ByteRange> {
        // offsets were range-checked in `from_bytes`
        let start = self.offsets.get_u64(pos * 8)? as usize;
        let end = if pos + 1 < self.count {
            self.offsets.get_u64((pos + 1) * 8)? as usize
        } else {
            self.data.len()
        };
        self.data.slice(start..end)
    }

    /// Index `id`, decoded once and then served from the cache.
    pub fn get(&self, id: u32) -> Result<Index> {
        let pos = id as usize;
        if pos >= self.count {
            return Err(IndexError::OutOfBounds {
                pos,
                size: self.count,
            });
        }
        if let Some(index) = self.cache.read().get(&id) {
            return Ok(index.clone());
        }

        let index = Index::from_bytes(self.span(pos)?)?;
        Ok(self.cache.write().entry(id).or_insert(index).clone())
    }

    /// Indexes currently cached.
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }

    /// Drop every cached index.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}
