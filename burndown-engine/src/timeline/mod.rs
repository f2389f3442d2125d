//! Persistent line timeline: an implicit treap over `(length, value)` runs.
//!
//! Positions are never stored as keys; positional split and merge operate on
//! the `size` field (sum of run lengths in a subtree). Nodes live in a
//! per-timeline arena with a free-list pool, so indices replace pointers and
//! spill snapshots carry only linear segment arrays, never tree structure.
//! The rightmost node is always a zero-length sentinel valued
//! [`TREE_END`]; it is excluded from lengths, snapshots, and queries.

pub mod index;

use serde::{Deserialize, Serialize};

use burndown_core::constants::{DEFAULT_COALESCE_CADENCE, TREE_END};
use burndown_core::types::timekey::TimeKey;

pub use index::{OwnedRange, RangeIndex};

const NIL: u32 = u32::MAX;

/// A contiguous run of lines sharing one time key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub length: u32,
    pub value: TimeKey,
}

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    length: u32,
    value: TimeKey,
    /// Sum of `length` over this node's subtree.
    size: u32,
    priority: u64,
    left: u32,
    right: u32,
}

#[derive(Debug, Clone, Copy)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: seed | 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// Ordered sequence of line runs with O(log n) positional edits.
#[derive(Debug, Clone)]
pub struct Timeline {
    nodes: Vec<Node>,
    free: Vec<u32>,
    root: u32,
    rng: XorShift64,
    edits_since_coalesce: u32,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    /// Empty timeline: just the sentinel.
    pub fn new() -> Self {
        let mut timeline = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NIL,
            rng: XorShift64::new(1),
            edits_since_coalesce: 0,
        };
        timeline.root = timeline.acquire(0, TREE_END);
        timeline
    }

    /// Timeline holding a single run of `length` lines valued `value`,
    /// followed by the sentinel.
    pub fn with_segment(value: TimeKey, length: u32) -> Self {
        let mut timeline = Self::new();
        if length > 0 {
            let node = timeline.acquire(length, value);
            timeline.root = timeline.merge(node, timeline.root);
        }
        timeline
    }

    /// Rebuild a timeline from a linear segment snapshot.
    pub fn from_segments(segments: &[Segment]) -> Self {
        let mut timeline = Self::new();
        timeline.reconstruct_from_segments(segments);
        timeline
    }

    /// Current line count, excluding the sentinel.
    pub fn len(&self) -> u32 {
        self.subtree_size(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete `delete` lines starting at `position`, then insert `insert`
    /// lines valued `value` there. Out-of-range positions and overlong
    /// deletes are clamped; zero counts make this a pure insertion or pure
    /// deletion.
    pub fn replace(&mut self, position: u32, delete: u32, insert: u32, value: TimeKey) {
        let total = self.len();
        let position = position.min(total);
        let delete = delete.min(total - position);

        let (left, rest) = self.split(self.root, position);
        let (deleted, rest) = self.split(rest, delete);
        self.release_subtree(deleted);

        let merged = if insert > 0 {
            // Extend an adjacent same-value run instead of creating a
            // trivially mergeable pair at the seam.
            if self.extend_rightmost(left, value, insert) {
                self.merge(left, rest)
            } else if self.extend_leftmost(rest, value, insert) {
                self.merge(left, rest)
            } else {
                let node = self.acquire(insert, value);
                let left = self.merge(left, node);
                self.merge(left, rest)
            }
        } else {
            self.merge(left, rest)
        };
        self.root = merged;

        self.edits_since_coalesce += 1;
        if self.edits_since_coalesce >= DEFAULT_COALESCE_CADENCE {
            self.coalesce_adjacent_same_value();
        }
    }

    /// In-order traversal emitting `(absolute_offset, length, value)` for
    /// every node, sentinel included.
    pub fn iterate(&self, mut visitor: impl FnMut(u32, u32, TimeKey)) {
        let mut stack: Vec<u32> = Vec::new();
        let mut node = self.root;
        let mut offset = 0u32;
        while node != NIL || !stack.is_empty() {
            while node != NIL {
                stack.push(node);
                node = self.nodes[node as usize].left;
            }
            let Some(idx) = stack.pop() else { break };
            let n = &self.nodes[idx as usize];
            visitor(offset, n.length, n.value);
            offset += n.length;
            node = n.right;
        }
    }

    /// Visit the runs overlapping `[lo, hi)` in order, emitting the clipped
    /// overlap length per run. Skips whole subtrees outside the window and
    /// the sentinel. O(log n + runs visited).
    pub fn for_each_in(&self, lo: u32, hi: u32, visitor: &mut impl FnMut(u32, TimeKey)) {
        if lo < hi {
            self.visit_range(self.root, 0, lo, hi, visitor);
        }
    }

    fn visit_range(
        &self,
        idx: u32,
        node_start: u32,
        lo: u32,
        hi: u32,
        visitor: &mut impl FnMut(u32, TimeKey),
    ) {
        if idx == NIL {
            return;
        }
        let n = &self.nodes[idx as usize];
        let node_end = node_start + n.size;
        if hi <= node_start || lo >= node_end {
            return;
        }
        let left_size = self.subtree_size(n.left);
        self.visit_range(n.left, node_start, lo, hi, visitor);
        let own_start = node_start + left_size;
        let own_end = own_start + n.length;
        let clip_start = own_start.max(lo);
        let clip_end = own_end.min(hi);
        if clip_start < clip_end && n.value != TREE_END {
            visitor(clip_end - clip_start, n.value);
        }
        self.visit_range(n.right, own_end, lo, hi, visitor);
    }

    /// Per-line expansion. Test and reconstruction helper; O(total lines).
    pub fn flatten(&self) -> Vec<TimeKey> {
        let mut lines = Vec::with_capacity(self.len() as usize);
        self.iterate(|_, length, value| {
            if value != TREE_END {
                for _ in 0..length {
                    lines.push(value);
                }
            }
        });
        lines
    }

    /// Rebuild from a per-line array, grouping adjacent equal values.
    pub fn reconstruct(&mut self, lines: &[TimeKey]) {
        let mut segments: Vec<Segment> = Vec::new();
        for &value in lines {
            match segments.last_mut() {
                Some(last) if last.value == value => last.length += 1,
                _ => segments.push(Segment { length: 1, value }),
            }
        }
        self.reconstruct_from_segments(&segments);
    }

    /// Linear snapshot excluding the sentinel.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        self.iterate(|_, length, value| {
            if value != TREE_END && length > 0 {
                segments.push(Segment { length, value });
            }
        });
        segments
    }

    /// Inverse of [`Timeline::segments`]: releases the current tree and
    /// rebuilds from the snapshot, appending the sentinel.
    pub fn reconstruct_from_segments(&mut self, segments: &[Segment]) {
        self.erase();
        // The sentinel is the root after erase; build content to its left.
        let sentinel = self.root;
        let mut root = NIL;
        for segment in segments {
            if segment.length == 0 || segment.value == TREE_END {
                continue;
            }
            let node = self.acquire(segment.length, segment.value);
            root = self.merge(root, node);
        }
        self.root = self.merge(root, sentinel);
    }

    /// One in-order sweep merging adjacent same-value runs. Rebuilds the
    /// tree only when at least one pair merged.
    pub fn coalesce_adjacent_same_value(&mut self) {
        self.edits_since_coalesce = 0;
        let mut segments: Vec<Segment> = Vec::new();
        let mut changed = false;
        self.iterate(|_, length, value| {
            if value == TREE_END || length == 0 {
                return;
            }
            match segments.last_mut() {
                Some(last) if last.value == value => {
                    last.length += length;
                    changed = true;
                }
                _ => segments.push(Segment { length, value }),
            }
        });
        if changed {
            self.reconstruct_from_segments(&segments);
        }
    }

    /// Number of runs, sentinel excluded.
    pub fn segment_count(&self) -> usize {
        let mut count = 0usize;
        self.iterate(|_, length, value| {
            if value != TREE_END && length > 0 {
                count += 1;
            }
        });
        count
    }

    /// Recompute every `size` bottom-up and assert structural invariants:
    /// size sums, the priority heap, positive run lengths, and the sentinel
    /// as the rightmost node. Test helper; panics on violation.
    pub fn validate(&self) {
        assert_ne!(self.root, NIL, "timeline lost its sentinel");
        let checked = self.validate_node(self.root);
        assert_eq!(
            checked,
            self.subtree_size(self.root),
            "root size disagrees with recomputed total"
        );
        // Rightmost node must be the sentinel.
        let mut node = self.root;
        loop {
            let n = &self.nodes[node as usize];
            if n.right == NIL {
                assert_eq!(n.value, TREE_END, "rightmost node is not the sentinel");
                assert_eq!(n.length, 0, "sentinel has nonzero length");
                break;
            }
            node = n.right;
        }
    }

    fn validate_node(&self, idx: u32) -> u32 {
        let n = self.nodes[idx as usize];
        let mut size = n.length;
        if n.value != TREE_END {
            assert!(n.length > 0, "zero-length run outside the sentinel");
        }
        for child in [n.left, n.right] {
            if child != NIL {
                assert!(
                    self.nodes[child as usize].priority <= n.priority,
                    "priority heap violated"
                );
                size += self.validate_node(child);
            }
        }
        assert_eq!(n.size, size, "stale subtree size");
        size
    }

    /// Return every node to the pool; only the sentinel remains.
    pub fn erase(&mut self) {
        let root = self.root;
        self.root = NIL;
        self.release_subtree(root);
        self.root = self.acquire(0, TREE_END);
    }

    /// Independent copy with its own arena and pool. Priorities are
    /// re-randomized on future edits via a reseeded stream.
    pub fn clone_deep(&self) -> Timeline {
        let mut clone = self.clone();
        clone.rng = XorShift64::new(self.nodes.len() as u64 ^ 0xA076_1D64_78BD_642F);
        clone
    }

    // ── arena ──────────────────────────────────────────────────────────────

    fn acquire(&mut self, length: u32, value: TimeKey) -> u32 {
        let priority = self.rng.next();
        match self.free.pop() {
            Some(idx) => {
                let n = &mut self.nodes[idx as usize];
                debug_assert_eq!((n.length, n.size, n.priority), (0, 0, 0));
                n.length = length;
                n.value = value;
                n.size = length;
                n.priority = priority;
                n.left = NIL;
                n.right = NIL;
                idx
            }
            None => {
                self.nodes.push(Node {
                    length,
                    value,
                    size: length,
                    priority,
                    left: NIL,
                    right: NIL,
                });
                (self.nodes.len() - 1) as u32
            }
        }
    }

    fn release(&mut self, idx: u32) {
        if idx == NIL {
            return;
        }
        self.nodes[idx as usize] = Node::default();
        self.free.push(idx);
    }

    fn release_subtree(&mut self, root: u32) {
        let mut pending = vec![root];
        while let Some(idx) = pending.pop() {
            if idx == NIL {
                continue;
            }
            let n = self.nodes[idx as usize];
            pending.push(n.left);
            pending.push(n.right);
            self.release(idx);
        }
    }

    // ── treap primitives ───────────────────────────────────────────────────

    fn subtree_size(&self, idx: u32) -> u32 {
        if idx == NIL {
            0
        } else {
            self.nodes[idx as usize].size
        }
    }

    fn update(&mut self, idx: u32) {
        let (left, right, length) = {
            let n = &self.nodes[idx as usize];
            (n.left, n.right, n.length)
        };
        self.nodes[idx as usize].size =
            self.subtree_size(left) + length + self.subtree_size(right);
    }

    /// Split into trees of total length `pos` and the remainder. A position
    /// strictly inside a run fragments it into two runs of the same value;
    /// the right fragment inherits the run's priority so the heap holds.
    fn split(&mut self, idx: u32, pos: u32) -> (u32, u32) {
        if idx == NIL {
            return (NIL, NIL);
        }
        let (left_child, right_child, length, value, priority) = {
            let n = &self.nodes[idx as usize];
            (n.left, n.right, n.length, n.value, n.priority)
        };
        let left_size = self.subtree_size(left_child);

        if pos <= left_size {
            if pos == left_size {
                self.nodes[idx as usize].left = NIL;
                self.update(idx);
                return (left_child, idx);
            }
            let (l, r) = self.split(left_child, pos);
            self.nodes[idx as usize].left = r;
            self.update(idx);
            (l, idx)
        } else if pos >= left_size + length {
            let (l, r) = self.split(right_child, pos - left_size - length);
            self.nodes[idx as usize].right = l;
            self.update(idx);
            (idx, r)
        } else {
            // Cut inside this run.
            let keep = pos - left_size;
            let frag_len = length - keep;
            self.nodes[idx as usize].length = keep;
            self.nodes[idx as usize].right = NIL;
            self.update(idx);
            let frag = self.acquire(frag_len, value);
            self.nodes[frag as usize].priority = priority;
            let rest = self.merge(frag, right_child);
            (idx, rest)
        }
    }

    fn merge(&mut self, a: u32, b: u32) -> u32 {
        if a == NIL {
            return b;
        }
        if b == NIL {
            return a;
        }
        if self.nodes[a as usize].priority >= self.nodes[b as usize].priority {
            let right = self.nodes[a as usize].right;
            let merged = self.merge(right, b);
            self.nodes[a as usize].right = merged;
            self.update(a);
            a
        } else {
            let left = self.nodes[b as usize].left;
            let merged = self.merge(a, left);
            self.nodes[b as usize].left = merged;
            self.update(b);
            b
        }
    }

    /// If the rightmost run of `subtree` (skipping the sentinel, which never
    /// lives in a left split) has `value`, grow it by `extra`.
    fn extend_rightmost(&mut self, subtree: u32, value: TimeKey, extra: u32) -> bool {
        if subtree == NIL {
            return false;
        }
        let mut path = Vec::new();
        let mut node = subtree;
        loop {
            path.push(node);
            let right = self.nodes[node as usize].right;
            if right == NIL {
                break;
            }
            node = right;
        }
        if self.nodes[node as usize].value != value {
            return false;
        }
        self.nodes[node as usize].length += extra;
        for idx in path.into_iter().rev() {
            self.update(idx);
        }
        true
    }

    /// If the leftmost run of `subtree` has `value`, grow it by `extra`.
    /// The sentinel can be leftmost only in an empty timeline; its value
    /// never matches a real key.
    fn extend_leftmost(&mut self, subtree: u32, value: TimeKey, extra: u32) -> bool {
        if subtree == NIL {
            return false;
        }
        let mut path = Vec::new();
        let mut node = subtree;
        loop {
            path.push(node);
            let left = self.nodes[node as usize].left;
            if left == NIL {
                break;
            }
            node = left;
        }
        if self.nodes[node as usize].value != value || self.nodes[node as usize].length == 0 {
            return false;
        }
        self.nodes[node as usize].length += extra;
        for idx in path.into_iter().rev() {
            self.update(idx);
        }
        true
    }
}
