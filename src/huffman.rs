//! Table-driven Huffman decoding, plus the build-time code constructor.
//!
//! # Table layout
//!
//! ```text
//! [node_count: varint]
//! node_count x [bit_length: u8][initial_child_ptr: varint]
//! [leaf_count: varint]
//! leaf_count x [value: u32 LE][code_length: u24 LE]
//! ```
//!
//! Node 0 is the root. A node with `bit_length == 0` is internal and its two
//! children are the nodes `initial_child_ptr + 0` and `initial_child_ptr + 1`.
//! A node with a non-zero `bit_length` is reached after exactly that many
//! bits; its `initial_child_ptr` indexes the fixed-stride leaf record table.
//!
//! The decoder only trusts the table as far as bounds go: a walk that leaves
//! the node table, ends at the wrong depth, or disagrees with its leaf record
//! is reported as corrupt data. A table built for a different stream is not
//! detectable here.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};

use crate::bits::{BitReader, BitWriter};
use crate::cursor::{ByteCursor, ByteRange, ByteSink};
use crate::error::{IndexError, Result};

/// Size of one leaf record in bytes.
pub const LEAF_RECORD_LEN: usize = 7;

/// Longest code the encoder will emit.
pub const MAX_CODE_LEN: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct StaticNode {
    bit_length: u8,
    initial_child_ptr: u32,
}

/// A decoded leaf: the symbol and the length of its code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodePoint {
    /// Decoded symbol.
    pub value: u32,
    /// Code length in bits.
    pub length: u32,
}

/// Decoder over a serialized node table.
#[derive(Clone, Debug)]
pub struct HuffmanDecoder {
    nodes: Vec<StaticNode>,
    leaves: ByteCursor,
    leaf_count: usize,
}

impl HuffmanDecoder {
    /// Deserialize a table occupying all of `data`.
    pub fn from_bytes(data: ByteRange) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);

        let node_count = cursor.next_var_len()?;
        if node_count > cursor.remaining() / 2 {
            return Err(IndexError::corrupt(format!(
                "huffman table claims {} nodes in {} bytes",
                node_count,
                cursor.remaining()
            )));
        }
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let bit_length = cursor.next_u8()?;
            let initial_child_ptr = cursor.next_var_u32()?;
            nodes.push(StaticNode {
                bit_length,
                initial_child_ptr,
            });
        }

        let leaf_count = cursor.next_var_len()?;
        let leaf_bytes = leaf_count
            .checked_mul(LEAF_RECORD_LEN)
            .ok_or_else(|| IndexError::corrupt("huffman leaf table size overflows"))?;
        let leaves = ByteCursor::new(cursor.next_range(leaf_bytes)?);

        for node in &nodes {
            if node.bit_length != 0 && node.initial_child_ptr as usize >= leaf_count {
                return Err(IndexError::corrupt(format!(
                    "huffman leaf pointer {} past {} leaf records",
                    node.initial_child_ptr, leaf_count
                )));
            }
        }

        Ok(Self {
            nodes,
            leaves,
            leaf_count,
        })
    }

    /// Number of nodes in the table.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf records.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Leaf record `pos`.
    pub fn leaf(&self, pos: usize) -> Result<CodePoint> {
        if pos >= self.leaf_count {
            return Err(IndexError::corrupt(format!(
                "huffman leaf {} past {} leaf records",
                pos, self.leaf_count
            )));
        }
        let offset = pos * LEAF_RECORD_LEN;
        Ok(CodePoint {
            value: self.leaves.get_u32(offset)?,
            length: self.leaves.get_u24(offset + 4)?,
        })
    }

    /// Decode one symbol, consuming its code bits from `reader`.
    pub fn decode(&self, reader: &mut BitReader) -> Result<CodePoint> {
        let mut node = *self
            .nodes
            .first()
            .ok_or_else(|| IndexError::corrupt("decode with an empty huffman table"))?;
        let mut depth = 0u32;

        loop {
            if node.bit_length != 0 {
                if node.bit_length as u32 != depth {
                    return Err(IndexError::corrupt(format!(
                        "huffman leaf of length {} reached after {} bits",
                        node.bit_length, depth
                    )));
                }
                let point = self.leaf(node.initial_child_ptr as usize)?;
                if point.length != depth {
                    return Err(IndexError::corrupt(format!(
                        "huffman leaf record length {} disagrees with depth {}",
                        point.length, depth
                    )));
                }
                return Ok(point);
            }

            if depth >= u8::MAX as u32 {
                return Err(IndexError::corrupt("huffman walk exceeds 255 bits"));
            }
            let bit = reader.next_bit()?;
            depth += 1;
            let child = node.initial_child_ptr as usize + bit as usize;
            node = *self.nodes.get(child).ok_or_else(|| {
                IndexError::corrupt(format!(
                    "huffman child {} past {} nodes",
                    child,
                    self.nodes.len()
                ))
            })?;
        }
    }

    /// Decode one delta and add it to `acc`, returning the new absolute value.
    pub fn decode_delta(&self, reader: &mut BitReader, acc: &mut u32) -> Result<u32> {
        let delta = self.decode(reader)?.value;
        *acc = acc
            .checked_add(delta)
            .ok_or_else(|| IndexError::corrupt("delta stream overflows u32"))?;
        Ok(*acc)
    }
}

/// A canonical prefix code built from symbol frequencies.
///
/// This is build-time tooling: it produces the table consumed by
/// [`HuffmanDecoder`] and writes symbols as bits.
#[derive(Clone, Debug, Default)]
pub struct HuffmanCode {
    /// `(value, code, length)` in canonical order.
    symbols: Vec<(u32, u64, u32)>,
    lookup: HashMap<u32, usize>,
}

impl HuffmanCode {
    /// Build a code for the symbols of `values`, weighted by occurrence.
    pub fn from_symbols(values: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut freqs = BTreeMap::new();
        for value in values {
            *freqs.entry(value).or_insert(0u64) += 1;
        }
        Self::from_frequencies(&freqs)
    }

    /// Build a code from explicit symbol weights.
    pub fn from_frequencies(freqs: &BTreeMap<u32, u64>) -> Result<Self> {
        let lengths = code_lengths(freqs);
        if let Some(&(_, len)) = lengths.iter().max_by_key(|(_, len)| *len) {
            if len > MAX_CODE_LEN {
                return Err(IndexError::Unimplemented(format!(
                    "huffman codes longer than {} bits (got {})",
                    MAX_CODE_LEN, len
                )));
            }
        }

        let mut ordered = lengths;
        ordered.sort_by_key(|&(value, len)| (len, value));

        let mut symbols = Vec::with_capacity(ordered.len());
        let mut code = 0u64;
        let mut prev_len = ordered.first().map_or(0, |&(_, len)| len);
        for (value, len) in ordered {
            code <<= len - prev_len;
            symbols.push((value, code, len));
            code = code.wrapping_add(1);
            prev_len = len;
        }

        let lookup = symbols
            .iter()
            .enumerate()
            .map(|(i, &(value, _, _))| (value, i))
            .collect();

        tracing::debug!(symbols = symbols.len(), "built canonical huffman code");
        Ok(Self { symbols, lookup })
    }

    /// Number of distinct symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True if the code has no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// `(code, length)` for `value`, if it is part of the alphabet.
    pub fn code(&self, value: u32) -> Option<(u64, u32)> {
        self.lookup.get(&value).map(|&i| {
            let (_, code, len) = self.symbols[i];
            (code, len)
        })
    }

    /// Write the code for `value`.
    pub fn encode(&self, value: u32, writer: &mut BitWriter<'_>) -> Result<()> {
        let (code, len) = self.code(value).ok_or_else(|| {
            IndexError::InvalidInput(format!("symbol {} is not in the huffman alphabet", value))
        })?;
        writer.push_bits(code, len)
    }

    /// Serialize the decoding table.
    pub fn write_table(&self, sink: &mut ByteSink) -> Result<()> {
        let nodes = self.build_nodes()?;
        sink.put_var_uint(nodes.len() as u64);
        for node in &nodes {
            sink.put_u8(node.bit_length);
            sink.put_var_uint(node.initial_child_ptr as u64);
        }
        sink.put_var_uint(self.symbols.len() as u64);
        for &(value, _, len) in &self.symbols {
            sink.put_u32(value);
            sink.put_u24(len)?;
        }
        Ok(())
    }

    /// Lay the code trie out breadth-first so siblings are adjacent.
    fn build_nodes(&self) -> Result<Vec<StaticNode>> {
        if self.symbols.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Default)]
        struct TrieNode {
            children: [Option<usize>; 2],
            leaf: Option<(usize, u32)>,
        }

        let mut trie = vec![TrieNode::default()];
        for (leaf_idx, &(_, code, len)) in self.symbols.iter().enumerate() {
            let mut at = 0;
            for depth in (0..len).rev() {
                let bit = ((code >> depth) & 1) as usize;
                at = match trie[at].children[bit] {
                    Some(next) => next,
                    None => {
                        trie.push(TrieNode::default());
                        let next = trie.len() - 1;
                        trie[at].children[bit] = Some(next);
                        next
                    }
                };
            }
            trie[at].leaf = Some((leaf_idx, len));
        }

        let mut nodes = Vec::with_capacity(trie.len());
        let mut queue = VecDeque::from([0usize]);
        let mut next_index = 1u32;
        while let Some(at) = queue.pop_front() {
            let node = &trie[at];
            match node.leaf {
                Some((leaf_idx, len)) => nodes.push(StaticNode {
                    bit_length: len as u8,
                    initial_child_ptr: leaf_idx as u32,
                }),
                None => {
                    let first = node.children[0].ok_or_else(|| {
                        IndexError::InvalidInput("huffman code is not prefix-complete".into())
                    })?;
                    nodes.push(StaticNode {
                        bit_length: 0,
                        initial_child_ptr: next_index,
                    });
                    queue.push_back(first);
                    next_index += 1;
                    if let Some(second) = node.children[1] {
                        queue.push_back(second);
                        next_index += 1;
                    }
                }
            }
        }
        Ok(nodes)
    }
}

/// Huffman code lengths for each symbol. A lone symbol gets length 1.
fn code_lengths(freqs: &BTreeMap<u32, u64>) -> Vec<(u32, u32)> {
    let values: Vec<u32> = freqs.keys().copied().collect();
    match values.len() {
        0 => return Vec::new(),
        1 => return vec![(values[0], 1)],
        _ => {}
    }

    // parent links over an arena of leaves followed by merged nodes
    let mut parent: Vec<usize> = vec![usize::MAX; values.len()];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = freqs
        .values()
        .enumerate()
        .map(|(i, &weight)| Reverse((weight, i)))
        .collect();

    while heap.len() > 1 {
        let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        let merged = parent.len();
        parent.push(usize::MAX);
        parent[a] = merged;
        parent[b] = merged;
        heap.push(Reverse((wa.saturating_add(wb), merged)));
    }

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let mut len = 0;
            let mut at = i;
            while parent[at] != usize::MAX {
                at = parent[at];
                len += 1;
            }
            (value, len)
        })
        .collect()
}
