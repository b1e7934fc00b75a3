//! Property-based tests for ID set indexes.
//!
//! These tests verify invariants that must hold for all inputs, using
//! proptest to generate random ID sets and random encoding parameters.

use std::collections::BTreeSet;

use proptest::prelude::*;
use sidx::bits::{BitReader, BitWriter};
use sidx::cursor::{decode_var_uint, encode_var_uint};
use sidx::huffman::{HuffmanCode, HuffmanDecoder};
use sidx::set_ops::{fused_intersect_difference, intersect_all, intersect_limit_all, union_all};
use sidx::unpack::{pack_fields, unpacker};
use sidx::{BuildOptions, ByteCursor, ByteSink, Encoding, Index, IndexError};

/// Generate a sorted, unique set of IDs (possibly empty) within a universe.
fn sorted_unique_ids(max_len: usize, universe: u32) -> impl Strategy<Value = Vec<u32>> {
    (0..=max_len).prop_flat_map(move |len| {
        let len = len.min(universe as usize);
        proptest::collection::btree_set(0..universe, len)
            .prop_map(|set| set.into_iter().collect::<Vec<u32>>())
    })
}

/// Generate sparse IDs (large gaps, typical of inverted indexes).
fn sparse_ids(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::btree_set(any::<u32>(), 0..=max_len)
        .prop_map(|set| set.into_iter().collect())
}

/// Generate dense IDs (runs of consecutive IDs from a random start).
fn dense_ids(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    (0..100_000u32, 0..=max_len).prop_map(|(start, len)| (start..start + len as u32).collect())
}

fn encoding() -> impl Strategy<Value = Encoding> {
    prop_oneof![
        Just(Encoding::Plain),
        Just(Encoding::FrameOfReference),
        Just(Encoding::HuffmanDelta),
    ]
}

fn build_options() -> impl Strategy<Value = BuildOptions> {
    (encoding(), 1u32..=300, 0u32..=100).prop_map(|(encoding, block_size, interval)| {
        BuildOptions::new()
            .with_encoding(encoding)
            .with_block_size(block_size)
            .with_checkpoint_interval(interval)
    })
}

fn build_all(sets: &[(Vec<u32>, BuildOptions)]) -> Result<Vec<Index>, IndexError> {
    sets.iter()
        .map(|(ids, options)| Index::build(ids.clone(), options))
        .collect()
}

fn reopen(index: &Index) -> Index {
    Index::from_bytes(index.to_bytes().unwrap().into()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 300, max_local_rejects: u32::MAX, ..ProptestConfig::default() })]

    // =======================================================================
    // ROUNDTRIP INVARIANT: decode(encode(x)) == x
    // =======================================================================

    #[test]
    fn roundtrip_random_sets(ids in sorted_unique_ids(400, 20_000), options in build_options()) {
        let index = Index::build(ids.clone(), &options)?;
        prop_assert_eq!(index.encoding(), options.encoding);
        prop_assert_eq!(index.to_vec()?, ids.clone(), "roundtrip must preserve data");

        let reopened = reopen(&index);
        prop_assert_eq!(reopened.encoding(), options.encoding);
        prop_assert_eq!(reopened.to_vec()?, ids);
    }

    #[test]
    fn roundtrip_sparse_sets(ids in sparse_ids(200), options in build_options()) {
        let index = reopen(&Index::build(ids.clone(), &options)?);
        prop_assert_eq!(index.to_vec()?, ids);
    }

    #[test]
    fn roundtrip_dense_sets(ids in dense_ids(1000), options in build_options()) {
        let index = reopen(&Index::build(ids.clone(), &options)?);
        prop_assert_eq!(index.to_vec()?, ids);
    }

    // =======================================================================
    // BOUNDS: at(pos) == x[pos] inside, OutOfBounds outside
    // =======================================================================

    #[test]
    fn at_matches_source(ids in sorted_unique_ids(300, 50_000), options in build_options()) {
        let index = Index::build(ids.clone(), &options)?;
        prop_assert_eq!(index.size(), ids.len());
        for (pos, &id) in ids.iter().enumerate() {
            prop_assert_eq!(index.at(pos)?, id);
        }
        prop_assert_eq!(
            index.at(ids.len()).unwrap_err(),
            IndexError::OutOfBounds { pos: ids.len(), size: ids.len() }
        );
        prop_assert_eq!(index.first().ok(), ids.first().copied());
        prop_assert_eq!(index.last().ok(), ids.last().copied());
    }

    #[test]
    fn find_agrees_with_binary_search(
        ids in sorted_unique_ids(200, 5_000),
        lookups in proptest::collection::vec(0u32..5_100, 20),
        options in build_options(),
    ) {
        let index = Index::build(ids.clone(), &options)?;
        for target in lookups {
            prop_assert_eq!(index.find(target)?, ids.binary_search(&target).ok());
        }
    }

    // =======================================================================
    // ENCODING CONSTRAINTS
    // =======================================================================

    #[test]
    fn rejects_unsorted_ids((a, b) in (1u32..10_000, 0u32..10_000), options in build_options()) {
        prop_assume!(a >= b);
        let result = Index::build(vec![a, b], &options);
        prop_assert!(matches!(result, Err(IndexError::InvalidInput(_))), "should reject unsorted IDs");
    }

    #[test]
    fn every_truncation_is_rejected(ids in sorted_unique_ids(40, 1_000), options in build_options()) {
        let bytes = Index::build(ids, &options)?.to_bytes()?;
        for len in 0..bytes.len() {
            let result = Index::from_bytes(bytes[..len].to_vec().into());
            prop_assert!(result.is_err(), "prefix of {} / {} bytes decoded", len, bytes.len());
        }
    }

    #[test]
    fn single_byte_corruption_is_detected_or_harmless(
        ids in sorted_unique_ids(60, 5_000),
        options in build_options(),
        position in any::<prop::sample::Index>(),
        replacement in any::<u8>(),
    ) {
        let mut bytes = Index::build(ids, &options)?.to_bytes()?;
        let at = position.index(bytes.len());
        bytes[at] = replacement;

        // byte 1 is the encoding tag, which may now name a foreign encoding
        let expected = |err: &IndexError| {
            err.is_corrupt()
                || (at == 1
                    && matches!(err, IndexError::UnsupportedEncoding(_) | IndexError::Unimplemented(_)))
        };
        match Index::from_bytes(bytes.into()) {
            Err(err) => prop_assert!(expected(&err), "byte {} = {}: {:?}", at, replacement, err),
            Ok(index) => {
                match index.to_vec() {
                    Err(err) => prop_assert!(err.is_corrupt(), "byte {} = {}: {:?}", at, replacement, err),
                    Ok(values) => {
                        prop_assert_eq!(values.len(), index.size());
                        prop_assert!(values.windows(2).all(|w| w[0] < w[1]), "byte {} = {}: {:?}", at, replacement, values);
                    }
                }
                for pos in 0..index.size() {
                    if let Err(err) = index.at(pos) {
                        prop_assert!(err.is_corrupt(), "at({}) after byte {} = {}: {:?}", pos, at, replacement, err);
                    }
                }
            }
        }
    }

    #[test]
    fn encoding_is_deterministic(ids in sorted_unique_ids(100, 10_000), options in build_options()) {
        let first = Index::build(ids.clone(), &options)?.to_bytes()?;
        let second = Index::build(ids, &options)?.to_bytes()?;
        prop_assert_eq!(first, second, "encoding must be deterministic");
    }

    #[test]
    fn decoded_indexes_concatenate(
        a in sorted_unique_ids(50, 1_000),
        b in sorted_unique_ids(50, 1_000),
        opts_a in build_options(),
        opts_b in build_options(),
    ) {
        let mut sink = ByteSink::new();
        Index::build(a.clone(), &opts_a)?.append(&mut sink)?;
        Index::build(b.clone(), &opts_b)?.append(&mut sink)?;

        let mut cursor = ByteCursor::new(sink.into_range());
        prop_assert_eq!(Index::decode(&mut cursor)?.to_vec()?, a);
        prop_assert_eq!(Index::decode(&mut cursor)?.to_vec()?, b);
        prop_assert_eq!(cursor.remaining(), 0);
    }

    // =======================================================================
    // VARINT INVERSE LAW
    // =======================================================================

    #[test]
    fn varint_inverse(value in any::<u64>(), trailing in proptest::collection::vec(any::<u8>(), 0..4)) {
        let mut buf = Vec::new();
        let written = encode_var_uint(value, &mut buf);
        buf.extend_from_slice(&trailing);
        prop_assert_eq!(decode_var_uint(&buf)?, (value, written));
    }

    // =======================================================================
    // UNPACKER CORRECTNESS
    // =======================================================================

    #[test]
    fn unpack_inverts_pack(
        width in 1u32..=32,
        raw in proptest::collection::vec(any::<u32>(), 0..200),
    ) {
        let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
        let values: Vec<u32> = raw.iter().map(|v| v & mask).collect();

        let mut sink = ByteSink::new();
        pack_fields(&values, width, &mut sink)?;

        let unpacker = unpacker(width)?;
        let mut out = Vec::new();
        unpacker.unpack_into(sink.as_slice(), values.len(), &mut out)?;
        prop_assert_eq!(&out, &values);
        for (i, &value) in values.iter().enumerate() {
            prop_assert_eq!(unpacker.get(sink.as_slice(), i), value);
        }
    }

    // =======================================================================
    // HUFFMAN: prefix-free codes, exact stream reproduction
    // =======================================================================

    #[test]
    fn huffman_codes_are_prefix_free(symbols in proptest::collection::vec(0u32..64, 1..500)) {
        let code = HuffmanCode::from_symbols(symbols.iter().copied())?;
        let alphabet: BTreeSet<u32> = symbols.iter().copied().collect();
        let codes: Vec<(u64, u32)> = alphabet.iter().filter_map(|&s| code.code(s)).collect();
        prop_assert_eq!(codes.len(), alphabet.len());

        for (i, &(code_a, len_a)) in codes.iter().enumerate() {
            for &(code_b, len_b) in &codes[i + 1..] {
                let (short, short_len, long, long_len) = if len_a <= len_b {
                    (code_a, len_a, code_b, len_b)
                } else {
                    (code_b, len_b, code_a, len_a)
                };
                prop_assert_ne!(long >> (long_len - short_len), short);
            }
        }
    }

    #[test]
    fn huffman_stream_reproduces_symbols(symbols in proptest::collection::vec(any::<u32>().prop_map(|v| v % 1000), 1..500)) {
        let code = HuffmanCode::from_symbols(symbols.iter().copied())?;
        let mut table = ByteSink::new();
        code.write_table(&mut table)?;
        let decoder = HuffmanDecoder::from_bytes(table.into_range())?;

        let mut stream = ByteSink::new();
        let mut writer = BitWriter::new(&mut stream);
        for &symbol in &symbols {
            code.encode(symbol, &mut writer)?;
        }
        writer.flush();

        let mut reader = BitReader::new(stream.into_range());
        for &symbol in &symbols {
            prop_assert_eq!(decoder.decode(&mut reader)?.value, symbol);
        }
    }

    // =======================================================================
    // SET ALGEBRA vs BTreeSet, across backend pairings
    // =======================================================================

    #[test]
    fn set_algebra_matches_btreeset(
        a in sorted_unique_ids(200, 2_000),
        b in sorted_unique_ids(200, 2_000),
        opts_a in build_options(),
        opts_b in build_options(),
        out in build_options(),
    ) {
        let left = Index::build(a.clone(), &opts_a)?;
        let right = Index::build(b.clone(), &opts_b)?;
        let sa: BTreeSet<u32> = a.into_iter().collect();
        let sb: BTreeSet<u32> = b.into_iter().collect();

        prop_assert_eq!(
            left.union_with(&right, &out)?.to_vec()?,
            sa.union(&sb).copied().collect::<Vec<_>>()
        );
        prop_assert_eq!(
            left.intersect_with(&right, &out)?.to_vec()?,
            sa.intersection(&sb).copied().collect::<Vec<_>>()
        );
        prop_assert_eq!(
            left.difference_with(&right, &out)?.to_vec()?,
            sa.difference(&sb).copied().collect::<Vec<_>>()
        );
        prop_assert_eq!(
            left.symmetric_difference_with(&right, &out)?.to_vec()?,
            sa.symmetric_difference(&sb).copied().collect::<Vec<_>>()
        );
    }

    #[test]
    fn k_way_matches_btreeset(
        sets in proptest::collection::vec((sorted_unique_ids(60, 200), build_options()), 1..7),
    ) {
        let indexes = sets
            .iter()
            .map(|(ids, options)| Index::build(ids.clone(), options))
            .collect::<Result<Vec<_>, _>>()?;

        let mut union = BTreeSet::new();
        let mut common: BTreeSet<u32> = sets[0].0.iter().copied().collect();
        for (ids, _) in &sets {
            let set: BTreeSet<u32> = ids.iter().copied().collect();
            union.extend(set.iter().copied());
            common = common.intersection(&set).copied().collect();
        }

        let options = BuildOptions::default();
        prop_assert_eq!(union_all(&indexes, &options)?.to_vec()?, union.into_iter().collect::<Vec<_>>());
        prop_assert_eq!(intersect_all(&indexes, &options)?.to_vec()?, common.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn fused_intersect_difference_matches_btreeset(
        keep in proptest::collection::vec((sorted_unique_ids(80, 300), build_options()), 0..5),
        subtract in proptest::collection::vec((sorted_unique_ids(80, 300), build_options()), 0..4),
        limit in 0usize..100,
        modulus in 1u32..5,
    ) {
        let keep_indexes = build_all(&keep)?;
        let subtract_indexes = build_all(&subtract)?;

        let mut common = BTreeSet::new();
        if let Some(((first, _), rest)) = keep.split_first() {
            common = first.iter().copied().collect();
            for (ids, _) in rest {
                let set: BTreeSet<u32> = ids.iter().copied().collect();
                common = common.intersection(&set).copied().collect();
            }
        }
        let mut remaining = common.clone();
        for (ids, _) in &subtract {
            for id in ids {
                remaining.remove(id);
            }
        }

        let accept = |id: u32| id % modulus == 0;
        let capped = |set: &BTreeSet<u32>, filtered: bool| -> Vec<u32> {
            set.iter()
                .copied()
                .filter(|&id| !filtered || accept(id))
                .take(limit)
                .collect()
        };

        let options = BuildOptions::default();
        prop_assert_eq!(
            fused_intersect_difference(&keep_indexes, &subtract_indexes, limit, None, &options)?.to_vec()?,
            capped(&remaining, false)
        );
        prop_assert_eq!(
            fused_intersect_difference(&keep_indexes, &subtract_indexes, limit, Some(&accept), &options)?.to_vec()?,
            capped(&remaining, true)
        );
        prop_assert_eq!(
            intersect_limit_all(&keep_indexes, limit, None, &options)?.to_vec()?,
            capped(&common, false)
        );
        prop_assert_eq!(
            intersect_limit_all(&keep_indexes, limit, Some(&accept), &options)?.to_vec()?,
            capped(&common, true)
        );
    }
}

// =======================================================================
// FIXED CASES (not proptest, but important)
// =======================================================================

#[test]
fn varint_boundary_values() {
    for value in [0u64, 1, 127, 128, u32::MAX as u64, u64::MAX] {
        let mut buf = Vec::new();
        let len = encode_var_uint(value, &mut buf);
        assert_eq!(decode_var_uint(&buf).unwrap(), (value, len));
    }
    let mut buf = Vec::new();
    assert_eq!(encode_var_uint(128, &mut buf), 2);
    assert_eq!(buf, vec![0x80, 0x01]);
}

#[test]
fn frame_of_reference_selects_minimal_width() {
    let options = BuildOptions::new()
        .with_encoding(Encoding::FrameOfReference)
        .with_block_size(4);
    let index = Index::build(vec![1000, 1001, 1002, 1003], &options).unwrap();
    assert_eq!(index.to_vec().unwrap(), vec![1000, 1001, 1002, 1003]);

    let bytes = index.to_bytes().unwrap();
    let mut cursor = ByteCursor::new(bytes[2..].to_vec().into());
    let payload = sidx::backend::ForIndex::decode(&mut cursor).unwrap();
    assert_eq!(payload.block_width(0).unwrap(), 2);
}

#[test]
fn compressed_encodings_beat_plain_on_dense_sets() {
    let dense: Vec<u32> = (0..5000u32).map(|i| 10_000 + i * 3).collect();
    let plain = Index::from_ids(dense.clone()).unwrap();
    for encoding in [Encoding::FrameOfReference, Encoding::HuffmanDelta] {
        let index = Index::build(dense.clone(), &BuildOptions::new().with_encoding(encoding)).unwrap();
        assert!(
            index.size_in_bytes() * 2 < plain.size_in_bytes(),
            "{:?} used {} bytes, plain {}",
            encoding,
            index.size_in_bytes(),
            plain.size_in_bytes()
        );
    }
}
