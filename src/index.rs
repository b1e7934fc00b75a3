//! The [`Index`] value type and its container format.
//!
//! A stored index is `[version: u8][encoding tag: u8][payload]`. The version
//! is checked before anything else; the tag selects the decoder through the
//! process-wide registry (see [`crate::registry`]).
//!
//! An `Index` is immutable. Set algebra and re-encoding produce new values.
//! Decoded indexes keep a handle on their source bytes, so the bytes live
//! as long as any index (or clone) built from them.

use std::iter::FusedIterator;

use crate::backend::{
    ForEncoder, ForIndex, ForIter, HuffmanDeltaEncoder, HuffmanIndex, HuffmanIter, PlainEncoder,
    PlainIndex,
};
use crate::config::BuildOptions;
use crate::cursor::{var_uint_len, ByteCursor, ByteRange, ByteSink};
use crate::error::{IndexError, Result};
use crate::registry;
use crate::traits::{IdSequence, IndexEncoder};

/// Container format version written and accepted by this crate.
pub const FORMAT_VERSION: u8 = 1;

/// Encoding of a stored index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// Uncompressed little-endian `u32`s.
    #[default]
    Plain,
    /// Frame-of-reference blocks of bit-packed deltas.
    FrameOfReference,
    /// Huffman-coded gaps.
    HuffmanDelta,
    /// Elias-Fano (reserved tag, no codec yet).
    EliasFano,
    /// Run-length coded gaps (reserved tag, no codec yet).
    RunLengthDelta,
}

impl Encoding {
    /// Tag byte stored in the container header.
    pub const fn tag(self) -> u8 {
        match self {
            Encoding::Plain => 1,
            Encoding::FrameOfReference => 2,
            Encoding::HuffmanDelta => 3,
            Encoding::EliasFano => 4,
            Encoding::RunLengthDelta => 5,
        }
    }

    /// Encoding for a stored tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Encoding::Plain),
            2 => Ok(Encoding::FrameOfReference),
            3 => Ok(Encoding::HuffmanDelta),
            4 => Ok(Encoding::EliasFano),
            5 => Ok(Encoding::RunLengthDelta),
            other => Err(IndexError::UnsupportedEncoding(other)),
        }
    }

    /// True if this crate can encode and decode this encoding.
    pub const fn is_implemented(self) -> bool {
        matches!(
            self,
            Encoding::Plain | Encoding::FrameOfReference | Encoding::HuffmanDelta
        )
    }

    /// Encoder configured from `options`.
    ///
    /// Reserved encodings fail with [`IndexError::Unimplemented`] rather than
    /// writing bytes no decoder agrees on.
    pub fn encoder(self, options: &BuildOptions) -> Result<Box<dyn IndexEncoder>> {
        match self {
            Encoding::Plain => Ok(Box::new(PlainEncoder)),
            Encoding::FrameOfReference => Ok(Box::new(ForEncoder::new(options.block_size)?)),
            Encoding::HuffmanDelta => {
                Ok(Box::new(HuffmanDeltaEncoder::new(options.checkpoint_interval)))
            }
            Encoding::EliasFano | Encoding::RunLengthDelta => Err(IndexError::Unimplemented(
                format!("{:?} encoding has no encoder", self),
            )),
        }
    }
}

/// Write `ids` as a complete stored index (header and payload).
pub fn write_index(ids: &[u32], options: &BuildOptions, sink: &mut ByteSink) -> Result<()> {
    options.validate()?;
    let encoder = options.encoding.encoder(options)?;
    sink.put_u8(FORMAT_VERSION);
    sink.put_u8(options.encoding.tag());
    encoder.encode_payload(ids, sink)
}

#[derive(Clone, Debug)]
enum Backend {
    Plain(PlainIndex),
    FrameOfReference(ForIndex),
    HuffmanDelta(HuffmanIndex),
}

impl Backend {
    fn as_sequence(&self) -> &dyn IdSequence {
        match self {
            Backend::Plain(b) => b,
            Backend::FrameOfReference(b) => b,
            Backend::HuffmanDelta(b) => b,
        }
    }
}

/// An immutable sorted set of unique `u32` IDs in one of several encodings.
///
/// # Example
///
/// ```rust
/// use sidx::{BuildOptions, Encoding, Index};
///
/// let a = Index::from_ids(vec![1, 2, 5, 9]).unwrap();
/// let b = Index::build(
///     vec![2, 4, 5],
///     &BuildOptions::new().with_encoding(Encoding::FrameOfReference),
/// )
/// .unwrap();
///
/// assert_eq!(a.union(&b).unwrap().to_vec().unwrap(), vec![1, 2, 4, 5, 9]);
/// assert_eq!(a.intersect(&b).unwrap().to_vec().unwrap(), vec![2, 5]);
/// ```
#[derive(Clone, Debug)]
pub struct Index {
    backend: Backend,
    stored: Option<ByteRange>,
}

impl Index {
    /// The empty index.
    pub fn empty() -> Self {
        Self::from_plain(PlainIndex::from_sorted_unchecked(Vec::new()))
    }

    /// In-memory plain index. `ids` must be sorted and unique.
    pub fn from_ids(ids: Vec<u32>) -> Result<Self> {
        Ok(Self::from_plain(PlainIndex::from_sorted(ids)?))
    }

    /// Encode `ids` as `options` asks. Plain indexes stay in memory.
    pub fn build(ids: Vec<u32>, options: &BuildOptions) -> Result<Self> {
        options.validate()?;
        if options.encoding == Encoding::Plain {
            return Self::from_ids(ids);
        }
        let mut sink = ByteSink::with_capacity(
            options.encoding.encoder(options)?.estimate_size(ids.len()) + 2,
        );
        write_index(&ids, options, &mut sink)?;
        Self::from_bytes(sink.into_range())
    }

    pub(crate) fn from_plain(plain: PlainIndex) -> Self {
        Self {
            backend: Backend::Plain(plain),
            stored: None,
        }
    }

    pub(crate) fn decode_plain(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(Self::from_plain(PlainIndex::decode(cursor)?))
    }

    pub(crate) fn decode_frame_of_reference(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            backend: Backend::FrameOfReference(ForIndex::decode(cursor)?),
            stored: None,
        })
    }

    pub(crate) fn decode_huffman_delta(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            backend: Backend::HuffmanDelta(HuffmanIndex::decode(cursor)?),
            stored: None,
        })
    }

    /// Decode a stored index starting at the beginning of `data`.
    ///
    /// Bytes after the index are ignored.
    pub fn from_bytes(data: ByteRange) -> Result<Self> {
        Self::decode(&mut ByteCursor::new(data))
    }

    /// Decode a stored index at the cursor, leaving the cursor after it.
    pub fn decode(cursor: &mut ByteCursor) -> Result<Self> {
        let start = cursor.position();
        let version = cursor.next_u8()?;
        if version != FORMAT_VERSION {
            return Err(IndexError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: version,
            });
        }

        let tag = cursor.next_u8()?;
        let decode = match registry::decoder(tag) {
            Some(decode) => decode,
            None => {
                let encoding = Encoding::from_tag(tag)?;
                return Err(IndexError::Unimplemented(format!(
                    "{:?} encoding has no decoder",
                    encoding
                )));
            }
        };

        let mut index = decode(cursor)?;
        index.stored = Some(cursor.range().slice(start..cursor.position())?);
        Ok(index)
    }

    /// Encoding of the backend holding the IDs.
    pub fn encoding(&self) -> Encoding {
        match self.backend {
            Backend::Plain(_) => Encoding::Plain,
            Backend::FrameOfReference(_) => Encoding::FrameOfReference,
            Backend::HuffmanDelta(_) => Encoding::HuffmanDelta,
        }
    }

    /// True if `at` runs in constant (or checkpoint-bounded) time.
    pub fn is_random_access(&self) -> bool {
        match &self.backend {
            Backend::Plain(_) | Backend::FrameOfReference(_) => true,
            Backend::HuffmanDelta(b) => b.has_checkpoints(),
        }
    }

    /// Number of IDs.
    pub fn size(&self) -> usize {
        self.backend.as_sequence().size()
    }

    /// True if the index holds no IDs.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// ID at `pos`, or [`IndexError::OutOfBounds`].
    ///
    /// Linear in `pos` for Huffman indexes stored without checkpoints.
    pub fn at(&self, pos: usize) -> Result<u32> {
        self.backend.as_sequence().at(pos)
    }

    /// Smallest ID.
    pub fn first(&self) -> Result<u32> {
        self.backend.as_sequence().first()
    }

    /// Largest ID.
    pub fn last(&self) -> Result<u32> {
        self.backend.as_sequence().last()
    }

    /// Ascending iterator starting at position 0.
    pub fn iter(&self) -> Iter<'_> {
        let inner = match &self.backend {
            Backend::Plain(b) => IterInner::Plain(b.as_slice().iter()),
            Backend::FrameOfReference(b) => IterInner::FrameOfReference(b.iter()),
            Backend::HuffmanDelta(b) => IterInner::HuffmanDelta(b.iter()),
        };
        Iter { inner }
    }

    /// All IDs in a vector.
    pub fn to_vec(&self) -> Result<Vec<u32>> {
        match &self.backend {
            Backend::Plain(b) => Ok(b.as_slice().to_vec()),
            _ => self.iter().collect(),
        }
    }

    /// Position of `id`, if present.
    pub fn find(&self, id: u32) -> Result<Option<usize>> {
        if let Backend::Plain(b) = &self.backend {
            return Ok(b.as_slice().binary_search(&id).ok());
        }

        if self.is_random_access() {
            let (mut lo, mut hi) = (0, self.size());
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                match self.at(mid)?.cmp(&id) {
                    std::cmp::Ordering::Less => lo = mid + 1,
                    std::cmp::Ordering::Greater => hi = mid,
                    std::cmp::Ordering::Equal => return Ok(Some(mid)),
                }
            }
            return Ok(None);
        }

        for (pos, value) in self.iter().enumerate() {
            let value = value?;
            if value == id {
                return Ok(Some(pos));
            }
            if value > id {
                break;
            }
        }
        Ok(None)
    }

    /// True if `id` is in the index.
    pub fn contains(&self, id: u32) -> Result<bool> {
        Ok(self.find(id)?.is_some())
    }

    /// True if both indexes hold the same IDs, whatever their encodings.
    pub fn same_ids(&self, other: &Index) -> Result<bool> {
        if self.size() != other.size() {
            return Ok(false);
        }
        for (a, b) in self.iter().zip(other.iter()) {
            if a? != b? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Stored bytes this index was decoded from, if any.
    pub fn stored_bytes(&self) -> Option<&ByteRange> {
        self.stored.as_ref()
    }

    /// Size of the stored form: the source bytes, or the plain encoding
    /// for in-memory indexes.
    pub fn size_in_bytes(&self) -> usize {
        match &self.stored {
            Some(bytes) => bytes.len(),
            None => 2 + var_uint_len(self.size() as u64) + self.size() * 4,
        }
    }

    /// Decode every ID into an in-memory plain index.
    pub fn materialize(&self) -> Result<Index> {
        match &self.backend {
            Backend::Plain(b) => Ok(Self::from_plain(b.clone())),
            _ => Ok(Self::from_plain(PlainIndex::from_sorted_unchecked(
                self.to_vec()?,
            ))),
        }
    }

    /// Re-encode with different options.
    pub fn encode_with(&self, options: &BuildOptions) -> Result<Index> {
        Self::build(self.to_vec()?, options)
    }

    /// Append the stored form to `sink`.
    ///
    /// Decoded indexes copy their source bytes verbatim; in-memory indexes
    /// are written as plain.
    pub fn append(&self, sink: &mut ByteSink) -> Result<()> {
        match (&self.stored, &self.backend) {
            (Some(bytes), _) => {
                sink.put_bytes(bytes.as_slice());
                Ok(())
            }
            (None, Backend::Plain(b)) => {
                sink.put_u8(FORMAT_VERSION);
                sink.put_u8(Encoding::Plain.tag());
                PlainEncoder.encode_payload(b.as_slice(), sink)
            }
            (None, _) => Err(IndexError::Unimplemented(format!(
                "serializing a {:?} index without source bytes",
                self.encoding()
            ))),
        }
    }

    /// The stored form as a new buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut sink = ByteSink::with_capacity(self.size_in_bytes());
        self.append(&mut sink)?;
        Ok(sink.into_vec())
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::empty()
    }
}

impl IdSequence for Index {
    fn size(&self) -> usize {
        Index::size(self)
    }

    fn at(&self, pos: usize) -> Result<u32> {
        Index::at(self, pos)
    }
}

impl TryFrom<Vec<u32>> for Index {
    type Error = IndexError;

    fn try_from(ids: Vec<u32>) -> Result<Self> {
        Index::from_ids(ids)
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = Result<u32>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over an [`Index`].
///
/// Yields `Err` once if the stored data turns out to be corrupt, then stops.
pub struct Iter<'a> {
    inner: IterInner<'a>,
}

enum IterInner<'a> {
    Plain(std::slice::Iter<'a, u32>),
    FrameOfReference(ForIter<'a>),
    HuffmanDelta(HuffmanIter<'a>),
}

impl Iterator for Iter<'_> {
    type Item = Result<u32>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Plain(it) => it.next().map(|&id| Ok(id)),
            IterInner::FrameOfReference(it) => it.next(),
            IterInner::HuffmanDelta(it) => it.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            IterInner::Plain(it) => it.size_hint(),
            IterInner::FrameOfReference(it) => it.size_hint(),
            IterInner::HuffmanDelta(it) => it.size_hint(),
        }
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

/// Collects a strictly increasing ID sequence and encodes it.
///
/// ```rust
/// use sidx::{BuildOptions, Encoding, IndexBuilder};
///
/// let mut builder =
///     IndexBuilder::new(BuildOptions::new().with_encoding(Encoding::HuffmanDelta)).unwrap();
/// for id in [3, 8, 9, 200] {
///     builder.push(id).unwrap();
/// }
/// let index = builder.finish().unwrap();
/// assert_eq!(index.at(2).unwrap(), 9);
/// ```
#[derive(Clone, Debug)]
pub struct IndexBuilder {
    options: BuildOptions,
    ids: Vec<u32>,
}

impl IndexBuilder {
    /// Builder producing indexes per `options`.
    pub fn new(options: BuildOptions) -> Result<Self> {
        options.validate()?;
        options.encoding.encoder(&options)?;
        Ok(Self {
            options,
            ids: Vec::new(),
        })
    }

    /// Builder with room for `capacity` IDs.
    pub fn with_capacity(options: BuildOptions, capacity: usize) -> Result<Self> {
        let mut builder = Self::new(options)?;
        builder.ids.reserve(capacity);
        Ok(builder)
    }

    /// Options this builder encodes with.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Append an ID larger than every ID pushed so far.
    pub fn push(&mut self, id: u32) -> Result<()> {
        if let Some(&last) = self.ids.last() {
            if id <= last {
                return Err(IndexError::InvalidInput(format!(
                    "IDs must be pushed in strictly increasing order, got {} after {}",
                    id, last
                )));
            }
        }
        self.ids.push(id);
        Ok(())
    }

    /// Push every ID of an ascending sequence.
    pub fn extend_sorted(&mut self, ids: impl IntoIterator<Item = u32>) -> Result<()> {
        for id in ids {
            self.push(id)?;
        }
        Ok(())
    }

    /// IDs pushed so far.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Write the encoded index to `sink` without consuming the builder.
    pub fn write_into(&self, sink: &mut ByteSink) -> Result<()> {
        write_index(&self.ids, &self.options, sink)
    }

    /// Encode the collected IDs.
    pub fn finish(self) -> Result<Index> {
        Index::build(self.ids, &self.options)
    }
}
