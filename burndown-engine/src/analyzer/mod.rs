//! The top-level history analyzer.
//!
//! Orchestrates the shards, the tick clock, rename routing, fork/merge for
//! branch-parallel history walks, per-commit delta collection, and shard
//! hibernation. The external driver feeds commits in topological order as
//! line-level edit operations; at tick boundaries it flushes the collected
//! deltas into the downstream aggregator.

pub mod checkpoint;

use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, info};

use burndown_core::config::BurndownConfig;
use burndown_core::constants::AUTHOR_MISSING;
use burndown_core::errors::{ConfigError, SpillError};
use burndown_core::interning::PathInterner;
use burndown_core::types::collections::FxHashMap;
use burndown_core::types::history::CommitResult;
use burndown_core::types::identifiers::{AuthorId, PathId, Tick};
use burndown_core::types::timekey::KeyCodec;
use serde_json::Value;

use crate::shard::{Shard, ShardDeltas};

/// Incremental burndown analyzer over one branch of history.
#[derive(Debug)]
pub struct HistoryAnalyzer {
    config: BurndownConfig,
    codec: KeyCodec,
    interner: PathInterner,
    shards: Vec<Shard>,
    tick: Tick,
    previous_tick: Tick,
    /// Synthetic author for merge-commit insertions;
    /// [`AUTHOR_MISSING`] outside merge commits.
    merged_author: AuthorId,
    /// Rename routing: old path id -> current path id.
    renames: FxHashMap<PathId, PathId>,
    /// Inverse routing; almost always a single predecessor.
    renames_reverse: FxHashMap<PathId, SmallVec<[PathId; 2]>>,
    hibernated: bool,
    initialized: bool,
}

impl HistoryAnalyzer {
    /// Construct with a config. Call [`HistoryAnalyzer::initialize`] before
    /// the first update.
    pub fn with_config(config: BurndownConfig) -> Self {
        Self {
            config,
            codec: KeyCodec::new(false),
            interner: PathInterner::new(),
            shards: Vec::new(),
            tick: 0,
            previous_tick: 0,
            merged_author: AUTHOR_MISSING,
            renames: FxHashMap::default(),
            renames_reverse: FxHashMap::default(),
            hibernated: false,
            initialized: false,
        }
    }

    /// Construct from a driver facts map and initialize.
    pub fn from_facts(facts: &FxHashMap<String, Value>) -> Result<Self, ConfigError> {
        let mut analyzer = Self::with_config(BurndownConfig::from_facts(facts)?);
        analyzer.initialize()?;
        Ok(analyzer)
    }

    /// Validate the config, clamp sampling, and build the shard set.
    pub fn initialize(&mut self) -> Result<(), ConfigError> {
        self.config.validate()?;
        self.config.sampling = self.config.effective_sampling();
        self.config.workers = self.config.workers.max(1);
        self.codec = KeyCodec::new(self.config.track_people);
        self.shards = (0..self.config.workers)
            .map(|i| Shard::new(i, self.codec, self.config.track_files))
            .collect();
        self.initialized = true;
        debug!(
            workers = self.config.workers,
            granularity = self.config.granularity,
            sampling = self.config.sampling,
            "analyzer initialized"
        );
        Ok(())
    }

    pub fn config(&self) -> &BurndownConfig {
        &self.config
    }

    pub fn interner(&self) -> &PathInterner {
        &self.interner
    }

    pub fn intern_path(&self, path: &str) -> PathId {
        self.interner.intern(path)
    }

    pub fn codec(&self) -> KeyCodec {
        self.codec
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn previous_tick(&self) -> Tick {
        self.previous_tick
    }

    // ── tick clock ─────────────────────────────────────────────────────────

    /// Advance the clock. Ticks never move backwards within a branch.
    pub fn set_tick(&mut self, tick: Tick) {
        debug_assert!(tick >= self.tick, "tick moved backwards");
        self.tick = tick;
    }

    /// Start a new tick: remember the previous one, drop the merge-author
    /// sentinel, and clear the shards' transient marks.
    pub fn on_new_tick(&mut self) {
        self.previous_tick = self.tick;
        self.merged_author = AUTHOR_MISSING;
        for shard in &mut self.shards {
            shard.clear_tick_marks();
        }
    }

    /// The current commit is a merge: attribute its insertions to the
    /// synthetic merge author (one past the real author ids).
    pub fn on_merge(&mut self) {
        if self.config.track_people {
            self.merged_author = self.config.people_count;
        }
    }

    // ── commit processing ──────────────────────────────────────────────────

    /// Apply one edit operation to the file behind `path_id`, following
    /// rename routing. Wakes hibernated shards first.
    pub fn update(
        &mut self,
        path_id: PathId,
        author: AuthorId,
        position: u32,
        delete: u32,
        insert: u32,
    ) -> Result<(), SpillError> {
        debug_assert!(self.initialized, "update before initialize");
        self.wake_if_hibernated()?;
        let id = self.resolve(path_id);
        let author = if self.merged_author != AUTHOR_MISSING {
            self.merged_author
        } else {
            author
        };
        let time = self.codec.pack(author, self.tick);
        let shard = self.shard_of(id);
        self.shards[shard].update_file(id, time, position, delete, insert);
        Ok(())
    }

    /// Record `old_path -> new_path`, reassigning the file's slot to the new
    /// id. The treap is moved, never rebuilt; stale updates addressed to the
    /// old id keep routing to the survivor.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> Result<(), SpillError> {
        self.wake_if_hibernated()?;
        let old_raw = self.interner.intern(old_path);
        let old_id = self.resolve(old_raw);
        let new_id = self.interner.intern(new_path);
        if old_id == new_id {
            return Ok(());
        }
        let from = self.shard_of(old_id);
        let to = self.shard_of(new_id);
        if let Some((file, history)) = self.shards[from].take_file(old_id) {
            self.shards[to].install_file(new_id, file, history);
            self.shards[to].mark_merged(new_id);
        }
        self.renames.insert(old_id, new_id);
        self.renames_reverse.entry(new_id).or_default().push(old_id);
        Ok(())
    }

    /// Delete the file behind `path`, recording the synthetic removal of all
    /// surviving cohorts in its history.
    pub fn delete_file(&mut self, path: &str) -> Result<(), SpillError> {
        self.wake_if_hibernated()?;
        let id = self.resolve(self.interner.intern(path));
        let author = if self.merged_author != AUTHOR_MISSING {
            self.merged_author
        } else {
            AUTHOR_MISSING
        };
        let time = self.codec.pack(author, self.tick);
        let shard = self.shard_of(id);
        self.shards[shard].delete_file(id, time);
        Ok(())
    }

    /// Fan in every shard's delta buffer into one commit result, snapshot
    /// ownership when author tracking is on, and reset the buffers. One
    /// rayon job per shard, joined on the pool's barrier.
    pub fn collect_deltas(&mut self) -> Result<CommitResult, SpillError> {
        let with_ownership = self.config.track_people;
        let partials: Vec<ShardDeltas> = self
            .shards
            .par_iter_mut()
            .map(|shard| shard.take_deltas(with_ownership))
            .collect();

        let mut result = CommitResult::default();
        let mut ownership = FxHashMap::default();
        for partial in partials {
            result.global.merge(&partial.global);
            for (author, history) in partial.people {
                result.people.entry(author).or_default().merge(&history);
            }
            result.matrix.merge(&partial.matrix);
            // Each path id is owned by exactly one shard: plain union.
            result.files.extend(partial.files);
            ownership.extend(partial.ownership);
        }
        if with_ownership {
            result.file_ownership = Some(ownership);
        }

        if self.config.hibernation_to_disk
            && self.config.hibernation_threshold > 0
            && self.estimated_state_size() > self.config.hibernation_threshold
        {
            self.hibernate()?;
        }
        Ok(result)
    }

    /// Conservative estimate of shard-held memory.
    pub fn estimated_state_size(&self) -> i64 {
        self.shards.iter().map(Shard::estimated_size).sum()
    }

    // ── hibernation ────────────────────────────────────────────────────────

    /// Spill every shard's files and histories to the hibernation dir.
    pub fn hibernate(&mut self) -> Result<(), SpillError> {
        let dir = self
            .config
            .hibernation_dir
            .clone()
            .ok_or(SpillError::NoSpillDir)?;
        for shard in &mut self.shards {
            shard.spill_files(&dir)?;
        }
        self.hibernated = true;
        info!(dir = %dir.display(), "analyzer hibernated");
        Ok(())
    }

    /// Restore every shard from its most recent spill.
    pub fn wake(&mut self) -> Result<(), SpillError> {
        let dir = self
            .config
            .hibernation_dir
            .clone()
            .ok_or(SpillError::NoSpillDir)?;
        for shard in &mut self.shards {
            shard.restore_files(&dir)?;
        }
        self.hibernated = false;
        Ok(())
    }

    fn wake_if_hibernated(&mut self) -> Result<(), SpillError> {
        if self.hibernated {
            self.wake()?;
        }
        Ok(())
    }

    // ── fork / merge ───────────────────────────────────────────────────────

    /// `n` independent analyzers for branch-parallel walks. Shards are deep
    /// copies with empty delta buffers; the path interner is shared by
    /// reference; fork rename tables start empty.
    pub fn fork(&self, n: usize) -> Vec<HistoryAnalyzer> {
        info!(n, "forking analyzer");
        (0..n)
            .map(|_| HistoryAnalyzer {
                config: self.config.clone(),
                codec: self.codec,
                interner: self.interner.clone(),
                shards: self.shards.iter().map(Shard::fork_clone).collect(),
                tick: self.tick,
                previous_tick: self.previous_tick,
                merged_author: AUTHOR_MISSING,
                renames: FxHashMap::default(),
                renames_reverse: FxHashMap::default(),
                hibernated: false,
                initialized: self.initialized,
            })
            .collect()
    }

    /// Union the branches' rename tables and advance the clock to the
    /// furthest branch. Treap state is not merged here: the driver replays
    /// each merge commit through this analyzer's own shards.
    pub fn merge(&mut self, branches: Vec<HistoryAnalyzer>) {
        for branch in branches {
            for (old, new) in branch.renames {
                self.renames.entry(old).or_insert(new);
            }
            for (new, olds) in branch.renames_reverse {
                self.renames_reverse.entry(new).or_default().extend(olds);
            }
            self.tick = self.tick.max(branch.tick);
        }
        info!(tick = self.tick, "merged analyzer branches");
    }

    // ── routing ────────────────────────────────────────────────────────────

    /// Follow the rename chain to the id a path's content currently lives
    /// under. Bounded by the table size against pathological cycles.
    fn resolve(&self, mut id: PathId) -> PathId {
        let mut hops = 0usize;
        while let Some(&next) = self.renames.get(&id) {
            if next == id || hops >= self.renames.len() {
                break;
            }
            id = next;
            hops += 1;
        }
        id
    }

    fn shard_of(&self, path_id: PathId) -> usize {
        (xxhash_rust::xxh3::xxh3_64(&path_id.to_le_bytes()) % self.shards.len() as u64) as usize
    }

    pub(crate) fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub(crate) fn shards_mut(&mut self) -> &mut [Shard] {
        &mut self.shards
    }

    pub(crate) fn clock_state(&self) -> (Tick, Tick) {
        (self.tick, self.previous_tick)
    }

    pub(crate) fn set_clock_state(&mut self, tick: Tick, previous_tick: Tick) {
        self.tick = tick;
        self.previous_tick = previous_tick;
    }

    pub(crate) fn rename_tables(
        &self,
    ) -> (
        &FxHashMap<PathId, PathId>,
        &FxHashMap<PathId, SmallVec<[PathId; 2]>>,
    ) {
        (&self.renames, &self.renames_reverse)
    }

    pub(crate) fn set_rename_tables(
        &mut self,
        renames: FxHashMap<PathId, PathId>,
        reverse: FxHashMap<PathId, SmallVec<[PathId; 2]>>,
    ) {
        self.renames = renames;
        self.renames_reverse = reverse;
    }

    pub(crate) fn replace_interner(&mut self, interner: PathInterner) {
        self.interner = interner;
    }

    pub(crate) fn set_people_dict(&mut self, dict: Vec<String>) {
        self.config.reversed_people_dict = dict;
    }
}
