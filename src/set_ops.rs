//! Set algebra over indexes of any encoding.
//!
//! Every operation is a single forward sorted merge over the two inputs'
//! iterators: `O(|a| + |b|)` comparisons, no random access, no backtracking.
//! The result is collected through an [`IndexBuilder`] and encoded as the
//! caller's [`BuildOptions`] ask (plain and in memory by default).

use std::cmp::Ordering;

use crate::config::BuildOptions;
use crate::error::Result;
use crate::index::{Encoding, Index, IndexBuilder, Iter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MergeOp {
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
}

impl MergeOp {
    /// Emit IDs found only on the left.
    fn keeps_left(self) -> bool {
        !matches!(self, MergeOp::Intersection)
    }

    /// Emit IDs found only on the right.
    fn keeps_right(self) -> bool {
        matches!(self, MergeOp::Union | MergeOp::SymmetricDifference)
    }

    /// Emit IDs found on both sides.
    fn keeps_both(self) -> bool {
        matches!(self, MergeOp::Union | MergeOp::Intersection)
    }

    fn capacity(self, left: usize, right: usize) -> usize {
        match self {
            MergeOp::Union | MergeOp::SymmetricDifference => left.saturating_add(right),
            MergeOp::Intersection => left.min(right),
            MergeOp::Difference => left,
        }
    }
}

/// An iterator with its current element pulled out for comparison.
struct MergeCursor<'a> {
    iter: Iter<'a>,
    current: Option<u32>,
}

impl<'a> MergeCursor<'a> {
    fn new(index: &'a Index) -> Result<Self> {
        let mut cursor = Self {
            iter: index.iter(),
            current: None,
        };
        cursor.advance()?;
        Ok(cursor)
    }

    #[inline]
    fn advance(&mut self) -> Result<()> {
        self.current = self.iter.next().transpose()?;
        Ok(())
    }
}

fn merge(a: &Index, b: &Index, op: MergeOp, limit: usize, options: &BuildOptions) -> Result<Index> {
    let capacity = op.capacity(a.size(), b.size()).min(limit);
    let mut out = IndexBuilder::with_capacity(*options, capacity)?;
    let mut left = MergeCursor::new(a)?;
    let mut right = MergeCursor::new(b)?;

    while out.len() < limit {
        match (left.current, right.current) {
            (None, None) => break,
            (Some(x), None) => {
                if !op.keeps_left() {
                    break;
                }
                out.push(x)?;
                left.advance()?;
            }
            (None, Some(y)) => {
                if !op.keeps_right() {
                    break;
                }
                out.push(y)?;
                right.advance()?;
            }
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Less => {
                    if op.keeps_left() {
                        out.push(x)?;
                    }
                    left.advance()?;
                }
                Ordering::Greater => {
                    if op.keeps_right() {
                        out.push(y)?;
                    }
                    right.advance()?;
                }
                Ordering::Equal => {
                    if op.keeps_both() {
                        out.push(x)?;
                    }
                    left.advance()?;
                    right.advance()?;
                }
            },
        }
    }

    let index = out.finish()?;
    tracing::trace!(
        op = ?op,
        left = a.size(),
        right = b.size(),
        output = index.size(),
        encoding = ?index.encoding(),
        "merged indexes"
    );
    Ok(index)
}

/// IDs in `a` or `b`.
pub fn union(a: &Index, b: &Index, options: &BuildOptions) -> Result<Index> {
    merge(a, b, MergeOp::Union, usize::MAX, options)
}

/// IDs in both `a` and `b`.
pub fn intersection(a: &Index, b: &Index, options: &BuildOptions) -> Result<Index> {
    merge(a, b, MergeOp::Intersection, usize::MAX, options)
}

/// IDs in `a` but not in `b`.
pub fn difference(a: &Index, b: &Index, options: &BuildOptions) -> Result<Index> {
    merge(a, b, MergeOp::Difference, usize::MAX, options)
}

/// IDs in exactly one of `a` and `b`.
pub fn symmetric_difference(a: &Index, b: &Index, options: &BuildOptions) -> Result<Index> {
    merge(a, b, MergeOp::SymmetricDifference, usize::MAX, options)
}

/// The `limit` smallest IDs of `a ∪ b`. The merge stops as soon as they
/// are known.
pub fn union_limit(a: &Index, b: &Index, limit: usize, options: &BuildOptions) -> Result<Index> {
    merge(a, b, MergeOp::Union, limit, options)
}

/// Union of every index in `indexes`. Empty input gives the empty index.
pub fn union_all(indexes: &[Index], options: &BuildOptions) -> Result<Index> {
    reduce(indexes, MergeOp::Union, options)
}

/// Intersection of every index in `indexes`. Empty input gives the empty
/// index.
pub fn intersect_all(indexes: &[Index], options: &BuildOptions) -> Result<Index> {
    reduce(indexes, MergeOp::Intersection, options)
}

/// Caller-supplied acceptance test applied to each candidate ID.
pub type IdFilter<'a> = &'a dyn Fn(u32) -> bool;

/// At most `limit` IDs present in every index of `indexes` and accepted by
/// `filter`. Empty input gives the empty index.
pub fn intersect_limit_all(
    indexes: &[Index],
    limit: usize,
    filter: Option<IdFilter<'_>>,
    options: &BuildOptions,
) -> Result<Index> {
    fused_intersect_difference(indexes, &[], limit, filter, options)
}

/// At most `limit` IDs of `(∩ intersect) − (∪ subtract)` accepted by
/// `filter`, smallest first.
///
/// All operands are walked forward together; neither the intersection nor
/// the union is materialized, and the walk stops once `limit` IDs are
/// collected. An empty `intersect` gives the empty index.
pub fn fused_intersect_difference(
    intersect: &[Index],
    subtract: &[Index],
    limit: usize,
    filter: Option<IdFilter<'_>>,
    options: &BuildOptions,
) -> Result<Index> {
    let capacity = intersect.iter().map(Index::size).min().unwrap_or(0).min(limit);
    let mut out = IndexBuilder::with_capacity(*options, capacity)?;
    let mut keep = intersect
        .iter()
        .map(MergeCursor::new)
        .collect::<Result<Vec<_>>>()?;
    let mut excluded = subtract
        .iter()
        .map(MergeCursor::new)
        .collect::<Result<Vec<_>>>()?;

    while out.len() < limit {
        let id = match next_common(&mut keep)? {
            Some(id) => id,
            None => break,
        };
        let accepted = match filter {
            Some(accept) => accept(id),
            None => true,
        };
        if accepted && !any_contains(&mut excluded, id)? {
            out.push(id)?;
        }
        for cursor in &mut keep {
            cursor.advance()?;
        }
    }

    let index = out.finish()?;
    tracing::trace!(
        intersect = intersect.len(),
        subtract = subtract.len(),
        limit,
        filtered = filter.is_some(),
        output = index.size(),
        "fused intersect-difference"
    );
    Ok(index)
}

/// Move every cursor forward to the smallest ID they all hold.
fn next_common(cursors: &mut [MergeCursor<'_>]) -> Result<Option<u32>> {
    let mut target = match cursors.first().and_then(|cursor| cursor.current) {
        Some(id) => id,
        None => return Ok(None),
    };
    'search: loop {
        for cursor in cursors.iter_mut() {
            loop {
                match cursor.current {
                    None => return Ok(None),
                    Some(id) if id < target => cursor.advance()?,
                    Some(id) if id > target => {
                        target = id;
                        continue 'search;
                    }
                    Some(_) => break,
                }
            }
        }
        return Ok(Some(target));
    }
}

/// Skip each cursor up to `id`; true if any of them holds it.
fn any_contains(cursors: &mut [MergeCursor<'_>], id: u32) -> Result<bool> {
    let mut found = false;
    for cursor in cursors.iter_mut() {
        while let Some(current) = cursor.current {
            if current >= id {
                break;
            }
            cursor.advance()?;
        }
        found |= cursor.current == Some(id);
    }
    Ok(found)
}

/// Combine pairwise as a balanced tree so each ID takes part in
/// `O(log n)` merges. Intermediate results stay plain.
fn reduce(indexes: &[Index], op: MergeOp, options: &BuildOptions) -> Result<Index> {
    match indexes {
        [] => Ok(Index::empty()),
        [only] => only.encode_with(options),
        _ => {
            let intermediate = options.with_encoding(Encoding::Plain);
            let (lo, hi) = indexes.split_at(indexes.len() / 2);
            let left = reduce(lo, op, &intermediate)?;
            if op == MergeOp::Intersection && left.is_empty() {
                return Index::build(Vec::new(), options);
            }
            let right = reduce(hi, op, &intermediate)?;
            merge(&left, &right, op, usize::MAX, options)
        }
    }
}

impl Index {
    /// `self ∪ other`, plain.
    pub fn union(&self, other: &Index) -> Result<Index> {
        union(self, other, &BuildOptions::default())
    }

    /// `self ∪ other`, encoded per `options`.
    pub fn union_with(&self, other: &Index, options: &BuildOptions) -> Result<Index> {
        union(self, other, options)
    }

    /// `self ∩ other`, plain.
    pub fn intersect(&self, other: &Index) -> Result<Index> {
        intersection(self, other, &BuildOptions::default())
    }

    /// `self ∩ other`, encoded per `options`.
    pub fn intersect_with(&self, other: &Index, options: &BuildOptions) -> Result<Index> {
        intersection(self, other, options)
    }

    /// `self − other`, plain.
    pub fn difference(&self, other: &Index) -> Result<Index> {
        difference(self, other, &BuildOptions::default())
    }

    /// `self − other`, encoded per `options`.
    pub fn difference_with(&self, other: &Index, options: &BuildOptions) -> Result<Index> {
        difference(self, other, options)
    }

    /// `self ⊕ other`, plain.
    pub fn symmetric_difference(&self, other: &Index) -> Result<Index> {
        symmetric_difference(self, other, &BuildOptions::default())
    }

    /// `self ⊕ other`, encoded per `options`.
    pub fn symmetric_difference_with(&self, other: &Index, options: &BuildOptions) -> Result<Index> {
        symmetric_difference(self, other, options)
    }
}
