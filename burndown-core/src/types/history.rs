//! Sparse and dense line-cohort histories, the author interaction matrix,
//! and the event payloads exchanged between the analyzer and the aggregator.
//!
//! A sparse history is a `tick -> band -> count` map: the band is the tick at
//! which a cohort of lines was written, the outer tick is when the count
//! applies. Counts may be negative (net deletions of that band within that
//! tick). A dense history is the forward-filled rectangular materialization
//! on the `(sample, band)` grid.

use serde::{Deserialize, Serialize};

use crate::types::collections::FxHashMap;
use crate::types::identifiers::{AuthorId, PathId, Tick};

/// Forward-filled rectangular history: `rows[sample][band]`.
pub type DenseHistory = Vec<Vec<i64>>;

/// Per-file line ownership snapshot: `author -> surviving line count`.
pub type OwnershipMap = FxHashMap<AuthorId, i32>;

/// Sparse 2D grid of line-cohort counts, storing only nonzero ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparseHistory {
    entries: FxHashMap<Tick, FxHashMap<Tick, i64>>,
}

impl SparseHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` lines of the `band` cohort at `tick`.
    pub fn add(&mut self, tick: Tick, band: Tick, delta: i64) {
        *self.entries.entry(tick).or_default().entry(band).or_insert(0) += delta;
    }

    /// Additively merge another history into this one.
    pub fn merge(&mut self, other: &SparseHistory) {
        for (&tick, bands) in &other.entries {
            let row = self.entries.entry(tick).or_default();
            for (&band, &count) in bands {
                *row.entry(band).or_insert(0) += count;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of inner-map entries, the unit of the memory estimate.
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(|bands| bands.len()).sum()
    }

    /// Latest tick present, if any.
    pub fn last_tick(&self) -> Option<Tick> {
        self.entries.keys().copied().max()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tick, &FxHashMap<Tick, i64>)> {
        self.entries.iter().map(|(&tick, bands)| (tick, bands))
    }

    /// Materialize on the `(sample = tick / sampling, band = tick / granularity)`
    /// grid with forward fill. An empty history yields a zero-row matrix.
    pub fn group(&self, last_tick: Tick, sampling: i32, granularity: i32) -> DenseHistory {
        debug_assert!(sampling >= 1 && granularity >= 1);
        if self.entries.is_empty() {
            return Vec::new();
        }
        let samples = (last_tick / sampling + 1).max(1) as usize;
        let bands = (last_tick / granularity + 1).max(1) as usize;

        let mut by_sample: FxHashMap<usize, Vec<(usize, i64)>> = FxHashMap::default();
        for (&tick, row) in &self.entries {
            if tick < 0 || tick > last_tick {
                continue;
            }
            let sample = (tick / sampling) as usize;
            let bucket = by_sample.entry(sample).or_default();
            for (&band, &count) in row {
                if band < 0 || band > last_tick {
                    continue;
                }
                bucket.push(((band / granularity) as usize, count));
            }
        }

        let mut dense = vec![vec![0i64; bands]; samples];
        for sample in 0..samples {
            if sample > 0 {
                let (filled, rest) = dense.split_at_mut(sample);
                rest[0].copy_from_slice(&filled[sample - 1]);
            }
            if let Some(deltas) = by_sample.get(&sample) {
                for &(band, count) in deltas {
                    dense[sample][band] += count;
                }
            }
        }
        dense
    }
}

/// Author interaction matrix. Row `a` records, for author `a`, how many
/// lines of which previous owners they have touched; the
/// [`crate::constants::AUTHOR_SELF`] column counts self-modifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix {
    rows: Vec<FxHashMap<AuthorId, i64>>,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `author` touched `delta` lines in column `col`
    /// (a previous owner, or a sentinel).
    pub fn record(&mut self, author: AuthorId, col: AuthorId, delta: i64) {
        if author < 0 {
            return;
        }
        let idx = author as usize;
        if idx >= self.rows.len() {
            self.rows.resize_with(idx + 1, FxHashMap::default);
        }
        *self.rows[idx].entry(col).or_insert(0) += delta;
    }

    /// Additively merge another matrix, growing this one as needed.
    pub fn merge(&mut self, other: &Matrix) {
        if other.rows.len() > self.rows.len() {
            self.rows.resize_with(other.rows.len(), FxHashMap::default);
        }
        for (row, src) in self.rows.iter_mut().zip(&other.rows) {
            for (&col, &count) in src {
                *row.entry(col).or_insert(0) += count;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.is_empty())
    }

    pub fn rows(&self) -> &[FxHashMap<AuthorId, i64>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Deltas collected from every shard over one commit, plus the per-file
/// ownership snapshot when author tracking is enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitResult {
    pub global: SparseHistory,
    pub people: FxHashMap<AuthorId, SparseHistory>,
    pub matrix: Matrix,
    pub files: FxHashMap<PathId, SparseHistory>,
    /// Snapshot, not a delta: the full ownership state as of this commit.
    pub file_ownership: Option<FxHashMap<PathId, OwnershipMap>>,
}

impl CommitResult {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
            && self.people.is_empty()
            && self.matrix.is_empty()
            && self.files.is_empty()
            && self.file_ownership.as_ref().map_or(true, |o| o.is_empty())
    }
}

/// Deep clone of the aggregator's running state at a tick boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickResult {
    pub global: SparseHistory,
    pub people: FxHashMap<AuthorId, SparseHistory>,
    pub matrix: Matrix,
    pub files: FxHashMap<PathId, SparseHistory>,
    pub file_ownership: FxHashMap<PathId, OwnershipMap>,
}

/// Payload of a per-commit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommitPayload {
    Commit(CommitResult),
    Empty,
}

/// Per-commit delta batch handed to the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitEvent {
    pub data: CommitPayload,
    pub tick: Tick,
    /// Commit timestamp, unix nanoseconds.
    pub timestamp: i64,
}

/// Payload of a per-tick snapshot event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TickPayload {
    Tick(TickResult),
}

/// Per-tick snapshot emitted by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickEvent {
    pub tick: Tick,
    pub data: TickPayload,
    /// Latest commit timestamp seen, unix nanoseconds.
    pub end_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_additive() {
        let mut a = SparseHistory::new();
        a.add(0, 0, 100);
        let mut b = SparseHistory::new();
        b.add(0, 0, -50);
        b.add(1, 0, 200);
        a.merge(&b);
        let dense = a.group(1, 1, 1);
        assert_eq!(dense, vec![vec![50, 0], vec![50, 200]]);
    }

    #[test]
    fn group_forward_fills_samples() {
        let mut h = SparseHistory::new();
        h.add(0, 0, 100);
        h.add(1, 0, -50);
        h.add(1, 1, 200);
        assert_eq!(h.group(1, 1, 1), vec![vec![100, 0], vec![50, 200]]);
    }

    #[test]
    fn group_of_empty_history_is_zero_rows() {
        let h = SparseHistory::new();
        assert!(h.group(10, 1, 1).is_empty());
    }

    #[test]
    fn group_with_coarse_buckets() {
        let mut h = SparseHistory::new();
        h.add(0, 0, 10);
        h.add(35, 30, 20);
        h.add(65, 0, -5);
        // sampling = granularity = 30: samples 0..=2, bands 0..=2
        let dense = h.group(65, 30, 30);
        assert_eq!(dense.len(), 3);
        assert_eq!(dense[0], vec![10, 0, 0]);
        assert_eq!(dense[1], vec![10, 20, 0]);
        assert_eq!(dense[2], vec![5, 20, 0]);
    }

    #[test]
    fn matrix_merge_grows_rows() {
        let mut a = Matrix::new();
        a.record(0, -2, 50);
        let mut b = Matrix::new();
        b.record(2, 0, 30);
        a.merge(&b);
        assert_eq!(a.row_count(), 3);
        assert_eq!(a.rows()[0][&-2], 50);
        assert_eq!(a.rows()[2][&0], 30);
    }

    #[test]
    fn entry_count_sums_inner_maps() {
        let mut h = SparseHistory::new();
        h.add(0, 0, 1);
        h.add(0, 1, 1);
        h.add(5, 0, 1);
        assert_eq!(h.entry_count(), 3);
    }
}
