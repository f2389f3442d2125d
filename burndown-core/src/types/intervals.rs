//! Generic interval tree with inclusive bounds.
//!
//! Built for a rebuild-then-query pattern: inserts and deletes mark the
//! structure stale, and the first query after a mutation re-sorts the
//! intervals and recomputes the max-endpoint augmentation over an implicit
//! balanced tree (midpoint recursion over the sorted slice).

use serde::{Deserialize, Serialize};

/// A stored interval. `high` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<K, V> {
    pub low: K,
    pub high: K,
    pub value: V,
}

/// Interval tree over `[low, high]` ranges with attached values.
#[derive(Debug, Clone, Default)]
pub struct IntervalTree<K, V> {
    intervals: Vec<Interval<K, V>>,
    /// `max_high[i]` = max `high` over the implicit subtree rooted at `i`.
    max_high: Vec<K>,
    stale: bool,
}

impl<K: Ord + Copy, V: Clone + PartialEq> IntervalTree<K, V> {
    pub fn new() -> Self {
        Self {
            intervals: Vec::new(),
            max_high: Vec::new(),
            stale: false,
        }
    }

    /// Insert `[low, high]` with `value`. Ranges with `high < low` are a
    /// programmer error.
    pub fn insert(&mut self, low: K, high: K, value: V) {
        debug_assert!(low <= high, "inverted interval");
        self.intervals.push(Interval { low, high, value });
        self.stale = true;
    }

    /// Remove the first stored interval equal to `(low, high, value)`.
    /// Returns whether anything was removed.
    pub fn delete(&mut self, low: K, high: K, value: &V) -> bool {
        let pos = self
            .intervals
            .iter()
            .position(|iv| iv.low == low && iv.high == high && iv.value == *value);
        match pos {
            Some(i) => {
                self.intervals.swap_remove(i);
                self.stale = true;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
        self.max_high.clear();
        self.stale = false;
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// All intervals overlapping `[lo, hi]` (inclusive on both ends).
    pub fn query_overlap(&mut self, lo: K, hi: K) -> Vec<Interval<K, V>> {
        self.ensure_index();
        let mut out = Vec::new();
        if !self.intervals.is_empty() {
            self.collect_overlaps(0, self.intervals.len(), lo, hi, &mut out);
        }
        out
    }

    /// All intervals containing the point `p`.
    pub fn query_point(&mut self, p: K) -> Vec<Interval<K, V>> {
        self.query_overlap(p, p)
    }

    fn ensure_index(&mut self) {
        if !self.stale {
            return;
        }
        self.intervals.sort_by_key(|iv| iv.low);
        self.max_high.clear();
        self.max_high
            .extend(self.intervals.iter().map(|iv| iv.high));
        if !self.intervals.is_empty() {
            Self::build_max(&self.intervals, &mut self.max_high, 0, self.intervals.len());
        }
        self.stale = false;
    }

    /// Fill `max_high[mid]` with the subtree max for the slice `[start, end)`.
    fn build_max(intervals: &[Interval<K, V>], max_high: &mut [K], start: usize, end: usize) -> K {
        let mid = start + (end - start) / 2;
        let mut max = intervals[mid].high;
        if start < mid {
            max = max.max(Self::build_max(intervals, max_high, start, mid));
        }
        if mid + 1 < end {
            max = max.max(Self::build_max(intervals, max_high, mid + 1, end));
        }
        max_high[mid] = max;
        max
    }

    fn collect_overlaps(&self, start: usize, end: usize, lo: K, hi: K, out: &mut Vec<Interval<K, V>>) {
        if start >= end {
            return;
        }
        let mid = start + (end - start) / 2;
        // Prune whole subtrees that end before the query starts.
        if self.max_high[mid] < lo {
            return;
        }
        self.collect_overlaps(start, mid, lo, hi, out);
        let node = &self.intervals[mid];
        if node.low <= hi && node.high >= lo {
            out.push(node.clone());
        }
        // Right subtree lows only grow; nothing there can start within range.
        if node.low <= hi {
            self.collect_overlaps(mid + 1, end, lo, hi, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(ranges: &[(u32, u32, u32)]) -> IntervalTree<u32, u32> {
        let mut tree = IntervalTree::new();
        for &(lo, hi, v) in ranges {
            tree.insert(lo, hi, v);
        }
        tree
    }

    #[test]
    fn query_overlap_returns_exact_intersections() {
        let mut tree = tree_of(&[(0, 9, 1), (10, 19, 2), (20, 29, 3), (5, 24, 4)]);
        let mut hits: Vec<u32> = tree.query_overlap(10, 19).iter().map(|iv| iv.value).collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![2, 4]);
    }

    #[test]
    fn inclusive_boundaries_match() {
        let mut tree = tree_of(&[(0, 9, 1), (10, 19, 2)]);
        let hits = tree.query_point(9);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, 1);
        let hits = tree.query_overlap(9, 10);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn delete_then_query() {
        let mut tree = tree_of(&[(0, 9, 1), (10, 19, 2)]);
        assert!(tree.delete(0, 9, &1));
        assert!(!tree.delete(0, 9, &1));
        assert_eq!(tree.len(), 1);
        assert!(tree.query_overlap(0, 9).is_empty());
    }

    #[test]
    fn dense_random_cross_check() {
        // Compare against a linear scan on a pseudo-random set.
        let mut seed = 0x2545F4914F6CDD1Du64;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };
        let ranges: Vec<(u32, u32, u32)> = (0..200)
            .map(|i| {
                let lo = (next() % 1000) as u32;
                let len = (next() % 50) as u32;
                (lo, lo + len, i)
            })
            .collect();
        let mut tree = tree_of(&ranges);
        for _ in 0..50 {
            let lo = (next() % 1000) as u32;
            let hi = lo + (next() % 100) as u32;
            let mut got: Vec<u32> = tree.query_overlap(lo, hi).iter().map(|iv| iv.value).collect();
            let mut want: Vec<u32> = ranges
                .iter()
                .filter(|&&(l, h, _)| l <= hi && h >= lo)
                .map(|&(_, _, v)| v)
                .collect();
            got.sort_unstable();
            want.sort_unstable();
            assert_eq!(got, want);
        }
    }
}
