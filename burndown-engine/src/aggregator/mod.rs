//! Downstream consumer of per-commit delta batches.
//!
//! Owns the running global/people/file histories and the interaction
//! matrix. Additive fields merge on every [`Aggregator::add`]; the file
//! ownership snapshot is overwritten, never accumulated. When the memory
//! estimate exceeds the spill budget the state is spilled to disk and
//! merged back on [`Aggregator::collect`].

pub mod spill;

use std::path::PathBuf;

use burndown_core::constants::SPARSE_ENTRY_BYTES;
use burndown_core::errors::SpillError;
use burndown_core::types::collections::FxHashMap;
use burndown_core::types::history::{
    CommitEvent, CommitPayload, Matrix, OwnershipMap, SparseHistory, TickEvent, TickPayload,
    TickResult,
};
use burndown_core::types::identifiers::{AuthorId, PathId, Tick};

/// Running aggregation of every commit delta added so far.
#[derive(Debug, Default)]
pub struct Aggregator {
    global: SparseHistory,
    people: FxHashMap<AuthorId, SparseHistory>,
    matrix: Matrix,
    files: FxHashMap<PathId, SparseHistory>,
    file_ownership: FxHashMap<PathId, OwnershipMap>,
    last_tick: Tick,
    end_time: i64,
    spill_budget: i64,
    spill_dir: Option<PathBuf>,
    spill_n: u32,
}

impl Aggregator {
    /// Aggregator that never spills.
    pub fn new() -> Self {
        Self {
            spill_budget: i64::MAX,
            ..Self::default()
        }
    }

    /// Aggregator that spills to `dir` whenever the memory estimate exceeds
    /// `budget` bytes.
    pub fn with_spill(dir: PathBuf, budget: i64) -> Self {
        Self {
            spill_budget: budget,
            spill_dir: Some(dir),
            ..Self::default()
        }
    }

    /// Merge one commit's deltas. Ownership is a snapshot and replaces the
    /// previous one wholesale. Auto-spills past the budget.
    pub fn add(&mut self, event: &CommitEvent) -> Result<(), SpillError> {
        if let CommitPayload::Commit(result) = &event.data {
            self.global.merge(&result.global);
            for (&author, history) in &result.people {
                self.people.entry(author).or_default().merge(history);
            }
            self.matrix.merge(&result.matrix);
            for (&path_id, history) in &result.files {
                self.files.entry(path_id).or_default().merge(history);
            }
            if let Some(ownership) = &result.file_ownership {
                self.file_ownership = ownership.clone();
            }
        }
        self.last_tick = self.last_tick.max(event.tick);
        self.end_time = self.end_time.max(event.timestamp);

        if self.spill_dir.is_some() && self.estimated_state_size() > self.spill_budget {
            self.spill()?;
        }
        Ok(())
    }

    /// Deep-cloned snapshot of the running state. Mutating the returned
    /// event never affects the aggregator.
    pub fn flush_tick(&self, tick: Tick) -> TickEvent {
        TickEvent {
            tick,
            data: TickPayload::Tick(TickResult {
                global: self.global.clone(),
                people: self.people.clone(),
                matrix: self.matrix.clone(),
                files: self.files.clone(),
                file_ownership: self.file_ownership.clone(),
            }),
            end_time: self.end_time,
        }
    }

    /// A single flush at the last tick seen.
    pub fn flush_all_ticks(&self) -> Vec<TickEvent> {
        vec![self.flush_tick(self.last_tick)]
    }

    /// `SPARSE_ENTRY_BYTES` per inner-map entry across all sparse
    /// histories. Monotone in state size; deliberately conservative.
    pub fn estimated_state_size(&self) -> i64 {
        let entries = self.global.entry_count()
            + self.people.values().map(SparseHistory::entry_count).sum::<usize>()
            + self.files.values().map(SparseHistory::entry_count).sum::<usize>();
        entries as i64 * SPARSE_ENTRY_BYTES
    }

    pub fn close(&mut self) -> Result<(), SpillError> {
        Ok(())
    }

    pub fn global(&self) -> &SparseHistory {
        &self.global
    }

    pub fn people(&self) -> &FxHashMap<AuthorId, SparseHistory> {
        &self.people
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    pub fn files(&self) -> &FxHashMap<PathId, SparseHistory> {
        &self.files
    }

    pub fn file_ownership(&self) -> &FxHashMap<PathId, OwnershipMap> {
        &self.file_ownership
    }

    pub fn last_tick(&self) -> Tick {
        self.last_tick
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn spill_count(&self) -> u32 {
        self.spill_n
    }
}
