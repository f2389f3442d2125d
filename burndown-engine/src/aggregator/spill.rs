//! Aggregator spill and restore.
//!
//! Each spill writes the current in-memory maps as one numbered file per
//! map, then frees them; the sequence of spill files is additive except for
//! the ownership snapshot, where only the newest matters. `collect` merges
//! every spill back, removes the consumed files, and resets the counter, so
//! a later spill cannot double count.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use burndown_core::errors::SpillError;
use burndown_core::types::collections::FxHashMap;
use burndown_core::types::history::{Matrix, OwnershipMap, SparseHistory};
use burndown_core::types::identifiers::{AuthorId, PathId};

use super::Aggregator;

/// Handoff descriptor for pipelines that move an aggregator across
/// processes: where the spills live and how many there are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpillState {
    pub dir: PathBuf,
    pub n: u32,
}

impl Aggregator {
    /// Write every in-memory map to numbered spill files and free them.
    /// Returns the approximate bytes freed.
    pub fn spill(&mut self) -> Result<i64, SpillError> {
        let dir = self.spill_dir.clone().ok_or(SpillError::NoSpillDir)?;
        fs::create_dir_all(&dir).map_err(|source| SpillError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        let n = self.spill_n;
        write_map(&dir, "global", n, &self.global)?;
        write_map(&dir, "people", n, &self.people)?;
        write_map(&dir, "matrix", n, &self.matrix)?;
        write_map(&dir, "files", n, &self.files)?;
        write_map(&dir, "ownership", n, &self.file_ownership)?;

        let freed = self.estimated_state_size();
        self.global = SparseHistory::default();
        self.people = FxHashMap::default();
        self.matrix = Matrix::default();
        self.files = FxHashMap::default();
        self.file_ownership = FxHashMap::default();
        self.spill_n += 1;
        info!(spill = n, freed, "aggregator spilled");
        Ok(freed)
    }

    /// Merge every spill file back into memory: additive for histories and
    /// the matrix, newest-wins for the ownership snapshot. Consumed files
    /// are removed and the counter reset, leaving the in-memory state equal
    /// to the sum of all commits ever added.
    pub fn collect(&mut self) -> Result<(), SpillError> {
        if self.spill_n == 0 {
            return Ok(());
        }
        let dir = self.spill_dir.clone().ok_or(SpillError::NoSpillDir)?;
        // Ownership added since the last spill is newer than any spill file.
        let memory_ownership_fresh = !self.file_ownership.is_empty();

        for n in 0..self.spill_n {
            let global: SparseHistory = read_map(&dir, "global", n)?;
            self.global.merge(&global);

            let people: FxHashMap<AuthorId, SparseHistory> = read_map(&dir, "people", n)?;
            for (author, history) in people {
                self.people.entry(author).or_default().merge(&history);
            }

            let matrix: Matrix = read_map(&dir, "matrix", n)?;
            self.matrix.merge(&matrix);

            let files: FxHashMap<PathId, SparseHistory> = read_map(&dir, "files", n)?;
            for (path_id, history) in files {
                self.files.entry(path_id).or_default().merge(&history);
            }

            if !memory_ownership_fresh {
                let ownership: FxHashMap<PathId, OwnershipMap> = read_map(&dir, "ownership", n)?;
                if !ownership.is_empty() {
                    self.file_ownership = ownership;
                }
            }
        }

        for n in 0..self.spill_n {
            for name in ["global", "people", "matrix", "files", "ownership"] {
                let path = spill_path(&dir, name, n);
                fs::remove_file(&path).map_err(|source| SpillError::Remove {
                    path: path.display().to_string(),
                    source,
                })?;
            }
        }
        debug!(spills = self.spill_n, "aggregator collected");
        self.spill_n = 0;
        Ok(())
    }

    /// Handoff state for cross-process pipelines.
    pub fn spill_state(&self) -> Option<SpillState> {
        self.spill_dir.as_ref().map(|dir| SpillState {
            dir: dir.clone(),
            n: self.spill_n,
        })
    }

    /// Adopt spill files produced elsewhere.
    pub fn restore_spill_state(&mut self, info: SpillState) {
        self.spill_dir = Some(info.dir);
        self.spill_n = info.n;
    }
}

fn spill_path(dir: &Path, name: &str, n: u32) -> PathBuf {
    dir.join(format!("{name}_{n}.json"))
}

fn write_map<T: Serialize>(dir: &Path, name: &'static str, n: u32, value: &T) -> Result<(), SpillError> {
    let payload = serde_json::to_vec(value)
        .map_err(|source| SpillError::Encode { what: name, source })?;
    let path = spill_path(dir, name, n);
    fs::write(&path, payload).map_err(|source| SpillError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn read_map<T: DeserializeOwned>(dir: &Path, name: &'static str, n: u32) -> Result<T, SpillError> {
    let path = spill_path(dir, name, n);
    let bytes = fs::read(&path).map_err(|source| SpillError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| SpillError::Decode {
        what: name,
        path: path.display().to_string(),
        source,
    })
}
