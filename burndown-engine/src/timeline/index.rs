//! Lazy interval-tree index over a timeline.
//!
//! Marked dirty on every update; rebuilt from `Timeline::iterate` on the
//! next query, skipping the sentinel and zero-length runs.

use burndown_core::constants::TREE_END;
use burndown_core::types::intervals::IntervalTree;
use burndown_core::types::timekey::TimeKey;

use super::Timeline;

/// A queried run: lines `[start_line, end_line)` owned by `owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedRange {
    pub start_line: u32,
    pub end_line: u32,
    pub owner: TimeKey,
}

/// Interval index answering "which runs overlap `[lo, hi)`".
#[derive(Debug, Clone, Default)]
pub struct RangeIndex {
    tree: IntervalTree<u32, TimeKey>,
    dirty: bool,
}

impl RangeIndex {
    pub fn new() -> Self {
        Self {
            tree: IntervalTree::new(),
            dirty: true,
        }
    }

    /// Invalidate after a timeline mutation.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Runs intersecting the half-open `[lo, hi)`, rebuilding first if the
    /// timeline changed since the last query.
    pub fn query(&mut self, timeline: &Timeline, lo: u32, hi: u32) -> Vec<OwnedRange> {
        if self.dirty {
            self.rebuild(timeline);
        }
        if hi <= lo {
            return Vec::new();
        }
        let mut ranges: Vec<OwnedRange> = self
            .tree
            .query_overlap(lo, hi - 1)
            .into_iter()
            .map(|iv| OwnedRange {
                start_line: iv.low,
                end_line: iv.high + 1,
                owner: iv.value,
            })
            .collect();
        ranges.sort_by_key(|r| r.start_line);
        ranges
    }

    fn rebuild(&mut self, timeline: &Timeline) {
        self.tree.clear();
        timeline.iterate(|offset, length, value| {
            if value == TREE_END || length == 0 {
                return;
            }
            self.tree.insert(offset, offset + length - 1, value);
        });
        self.dirty = false;
    }
}
