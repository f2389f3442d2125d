//! Analyzer checkpointing: a flat directory with one file per top-level
//! field. Treap state is deliberately not persisted here; the spill
//! mechanism owns file contents.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::info;

use burndown_core::errors::CheckpointError;
use burndown_core::interning::PathInterner;
use burndown_core::types::identifiers::{PathId, Tick};

use super::HistoryAnalyzer;

const INTERNER_FILE: &str = "interner.json";
const PEOPLE_FILE: &str = "people.json";
const TICK_FILE: &str = "tick.json";
const RENAMES_FILE: &str = "renames.json";
const SHARDS_FILE: &str = "shards.json";

#[derive(Debug, Serialize, Deserialize)]
struct ClockCheckpoint {
    tick: Tick,
    previous_tick: Tick,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RenamesCheckpoint {
    renames: Vec<(PathId, PathId)>,
    reverse: Vec<(PathId, Vec<PathId>)>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ShardCheckpoint {
    active_ids: Vec<PathId>,
    merged_by_id: Vec<PathId>,
}

impl HistoryAnalyzer {
    /// Persist the analyzer's bookkeeping to `dir`.
    pub fn save_checkpoint(&self, dir: &Path) -> Result<(), CheckpointError> {
        fs::create_dir_all(dir).map_err(|source| CheckpointError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        write_field(dir, INTERNER_FILE, "interner", &self.interner().snapshot())?;
        write_field(
            dir,
            PEOPLE_FILE,
            "people",
            &self.config().reversed_people_dict,
        )?;
        let (tick, previous_tick) = self.clock_state();
        write_field(dir, TICK_FILE, "tick", &ClockCheckpoint { tick, previous_tick })?;

        let (renames, reverse) = self.rename_tables();
        let mut renames_cp = RenamesCheckpoint {
            renames: renames.iter().map(|(&old, &new)| (old, new)).collect(),
            reverse: reverse
                .iter()
                .map(|(&new, olds)| (new, olds.to_vec()))
                .collect(),
        };
        renames_cp.renames.sort_unstable();
        renames_cp.reverse.sort_unstable();
        write_field(dir, RENAMES_FILE, "renames", &renames_cp)?;

        let shards_cp: Vec<ShardCheckpoint> = self
            .shards()
            .iter()
            .map(|shard| {
                let mut active: Vec<PathId> = shard.active_ids().iter().copied().collect();
                active.sort_unstable();
                let mut merged: Vec<PathId> = shard.merged_ids().iter().copied().collect();
                merged.sort_unstable();
                ShardCheckpoint {
                    active_ids: active,
                    merged_by_id: merged,
                }
            })
            .collect();
        write_field(dir, SHARDS_FILE, "shards", &shards_cp)?;

        info!(dir = %dir.display(), "checkpoint saved");
        Ok(())
    }

    /// Restore bookkeeping persisted by [`HistoryAnalyzer::save_checkpoint`].
    /// The analyzer must already be initialized with the same worker count.
    pub fn load_checkpoint(&mut self, dir: &Path) -> Result<(), CheckpointError> {
        let paths: Vec<String> = read_field(dir, INTERNER_FILE, "interner")?;
        self.replace_interner(PathInterner::from_snapshot(&paths));

        let people: Vec<String> = read_field(dir, PEOPLE_FILE, "people")?;
        self.set_people_dict(people);

        let clock: ClockCheckpoint = read_field(dir, TICK_FILE, "tick")?;
        self.set_clock_state(clock.tick, clock.previous_tick);

        let renames_cp: RenamesCheckpoint = read_field(dir, RENAMES_FILE, "renames")?;
        self.set_rename_tables(
            renames_cp.renames.into_iter().collect(),
            renames_cp
                .reverse
                .into_iter()
                .map(|(new, olds)| (new, SmallVec::from_vec(olds)))
                .collect(),
        );

        let shards_cp: Vec<ShardCheckpoint> = read_field(dir, SHARDS_FILE, "shards")?;
        for (shard, cp) in self.shards_mut().iter_mut().zip(shards_cp) {
            shard.restore_marks(cp.active_ids, cp.merged_by_id);
        }

        info!(dir = %dir.display(), "checkpoint loaded");
        Ok(())
    }
}

fn write_field<T: Serialize>(
    dir: &Path,
    file: &str,
    what: &'static str,
    value: &T,
) -> Result<(), CheckpointError> {
    let payload = serde_json::to_vec(value)
        .map_err(|source| CheckpointError::Encode { what, source })?;
    let path = dir.join(file);
    fs::write(&path, payload).map_err(|source| CheckpointError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn read_field<T: for<'de> Deserialize<'de>>(
    dir: &Path,
    file: &str,
    what: &'static str,
) -> Result<T, CheckpointError> {
    let path = dir.join(file);
    let bytes = fs::read(&path).map_err(|source| CheckpointError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Decode {
        what,
        path: path.display().to_string(),
        source,
    })
}
