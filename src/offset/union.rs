use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::ops::Range;

/// Minimal set of disjoint half-open ranges.
///
/// Ranges are keyed by start. After every [`add_range`](Self::add_range) no
/// two stored ranges overlap or touch, and their union equals the union of
/// everything added so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeUnion<P> {
    ranges: BTreeMap<P, P>,
}

impl<P> Default for RangeUnion<P> {
    fn default() -> Self {
        Self {
            ranges: BTreeMap::new(),
        }
    }
}

impl<P: Ord + Copy> RangeUnion<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Insert `range`, merging it with every stored range it overlaps or
    /// touches. Empty ranges are ignored.
    pub fn add_range(&mut self, range: Range<P>) {
        let Range { start, mut end } = range;
        if start >= end {
            return;
        }

        let mut merged_start = start;
        if let Some((&prev_start, &prev_end)) = self.ranges.range(..=start).next_back() {
            if prev_end >= start {
                if prev_end >= end {
                    // already covered
                    return;
                }
                merged_start = prev_start;
            }
        }

        // Stored ranges are disjoint and non-adjacent, so only those starting
        // inside the new range can be absorbed.
        let absorbed: Vec<(P, P)> = self
            .ranges
            .range((Excluded(start), Included(end)))
            .map(|(&s, &e)| (s, e))
            .collect();
        for (s, e) in absorbed {
            if e > end {
                end = e;
            }
            self.ranges.remove(&s);
        }

        self.ranges.insert(merged_start, end);
    }

    /// True if `pos` lies inside one of the stored ranges.
    pub fn contains(&self, pos: P) -> bool {
        self.ranges
            .range((Unbounded, Included(pos)))
            .next_back()
            .is_some_and(|(_, &end)| pos < end)
    }

    pub fn iter(&self) -> impl Iterator<Item = Range<P>> + '_ {
        self.ranges.iter().map(|(&start, &end)| start..end)
    }

    pub fn first(&self) -> Option<Range<P>> {
        self.ranges.first_key_value().map(|(&s, &e)| s..e)
    }
}

impl<P: Ord + Copy> std::ops::AddAssign<Range<P>> for RangeUnion<P> {
    fn add_assign(&mut self, range: Range<P>) {
        self.add_range(range);
    }
}

impl<P: Ord + Copy> Extend<Range<P>> for RangeUnion<P> {
    fn extend<I: IntoIterator<Item = Range<P>>>(&mut self, iter: I) {
        for range in iter {
            self.add_range(range);
        }
    }
}

impl<P: Ord + Copy> FromIterator<Range<P>> for RangeUnion<P> {
    fn from_iter<I: IntoIterator<Item = Range<P>>>(iter: I) -> Self {
        let mut union = Self::new();
        union.extend(iter);
        union
    }
}
