//! A per-worker partition of the analyzer's files.
//!
//! Files are statically assigned to shards by `hash(path_id) % shard_count`,
//! so a shard's files are only ever touched by one worker and no per-file
//! locking exists. Each shard owns a dense `files` slice (indexed by path
//! id, `None` for foreign or deleted ids), the per-file sparse histories,
//! and the delta buffer every mutation routes through.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use burndown_core::constants::{AUTHOR_MISSING, AUTHOR_SELF, SPARSE_ENTRY_BYTES};
use burndown_core::errors::SpillError;
use burndown_core::types::collections::{FxHashMap, FxHashSet};
use burndown_core::types::history::{Matrix, OwnershipMap, SparseHistory};
use burndown_core::types::identifiers::{AuthorId, PathId};
use burndown_core::types::timekey::{KeyCodec, TimeKey};

use crate::file::{DeltaSink, File};
use crate::timeline::Segment;

/// Per-commit delta buffer. All shard mutations route through
/// [`FileDeltaSink`], which resolves authors from packed keys and applies
/// the history update rules here.
#[derive(Debug, Default)]
pub struct DeltaBuffer {
    pub global: SparseHistory,
    pub people: FxHashMap<AuthorId, SparseHistory>,
    pub matrix: Matrix,
    pub files: FxHashMap<PathId, SparseHistory>,
}

impl DeltaBuffer {
    fn apply(
        &mut self,
        codec: KeyCodec,
        track_files: bool,
        path_id: PathId,
        time: TimeKey,
        previous_time: TimeKey,
        delta: i64,
    ) {
        let (new_author, tick) = codec.unpack(time);
        let (old_author, band) = codec.unpack(previous_time);

        self.global.add(tick, band, delta);
        if track_files {
            self.files.entry(path_id).or_default().add(tick, band, delta);
        }
        if codec.tracks_people() && old_author != AUTHOR_MISSING {
            self.people
                .entry(old_author)
                .or_default()
                .add(tick, band, delta);
            if new_author >= 0 {
                // Fresh insertions land in the SELF column; touching existing
                // lines lands in the previous owner's column, own lines
                // included.
                let col = if new_author == old_author && delta > 0 {
                    AUTHOR_SELF
                } else {
                    old_author
                };
                self.matrix.record(new_author, col, delta.abs());
            }
        }
    }
}

/// Sink adapter binding a delta buffer to the file currently being updated.
pub struct FileDeltaSink<'a> {
    buffer: &'a mut DeltaBuffer,
    codec: KeyCodec,
    track_files: bool,
    path_id: PathId,
}

impl DeltaSink for FileDeltaSink<'_> {
    fn record(&mut self, time: TimeKey, previous_time: TimeKey, delta: i64) {
        self.buffer
            .apply(self.codec, self.track_files, self.path_id, time, previous_time, delta);
    }
}

/// Full snapshot written by a shard spill. Supersedes every earlier spill
/// of the same shard.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ShardFilesSnapshot {
    pub files: Vec<(PathId, Vec<Segment>)>,
    pub file_histories: Vec<(PathId, SparseHistory)>,
}

/// Deltas taken out of a shard at collection time.
#[derive(Debug, Default)]
pub struct ShardDeltas {
    pub global: SparseHistory,
    pub people: FxHashMap<AuthorId, SparseHistory>,
    pub matrix: Matrix,
    pub files: FxHashMap<PathId, SparseHistory>,
    pub ownership: FxHashMap<PathId, OwnershipMap>,
}

#[derive(Debug)]
pub struct Shard {
    index: usize,
    codec: KeyCodec,
    track_files: bool,
    files: Vec<Option<File>>,
    file_histories: Vec<SparseHistory>,
    active_ids: FxHashSet<PathId>,
    merged_by_id: FxHashSet<PathId>,
    deletions_by_id: FxHashSet<PathId>,
    deltas: DeltaBuffer,
    spill_n: u32,
}

impl Shard {
    pub fn new(index: usize, codec: KeyCodec, track_files: bool) -> Self {
        Self {
            index,
            codec,
            track_files,
            files: Vec::new(),
            file_histories: Vec::new(),
            active_ids: FxHashSet::default(),
            merged_by_id: FxHashSet::default(),
            deletions_by_id: FxHashSet::default(),
            deltas: DeltaBuffer::default(),
            spill_n: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn active_ids(&self) -> &FxHashSet<PathId> {
        &self.active_ids
    }

    pub fn is_active(&self, path_id: PathId) -> bool {
        self.active_ids.contains(&path_id)
    }

    pub fn merged_ids(&self) -> &FxHashSet<PathId> {
        &self.merged_by_id
    }

    pub fn mark_merged(&mut self, path_id: PathId) {
        self.merged_by_id.insert(path_id);
    }

    /// Clear the transient per-tick marks.
    pub fn clear_tick_marks(&mut self) {
        self.merged_by_id.clear();
        self.deletions_by_id.clear();
    }

    fn ensure_slot(&mut self, path_id: PathId) {
        let needed = path_id as usize + 1;
        if self.files.len() < needed {
            self.files.resize_with(needed, || None);
            self.file_histories.resize_with(needed, SparseHistory::default);
        }
    }

    /// Apply one edit operation, creating the file on first touch.
    pub fn update_file(
        &mut self,
        path_id: PathId,
        time: TimeKey,
        position: u32,
        delete: u32,
        insert: u32,
    ) {
        self.ensure_slot(path_id);
        let slot = &mut self.files[path_id as usize];
        if slot.is_none() {
            let mut sink = FileDeltaSink {
                buffer: &mut self.deltas,
                codec: self.codec,
                track_files: self.track_files,
                path_id,
            };
            *slot = Some(File::new(time, 0, &mut sink));
            self.active_ids.insert(path_id);
        }
        let mut sink = FileDeltaSink {
            buffer: &mut self.deltas,
            codec: self.codec,
            track_files: self.track_files,
            path_id,
        };
        if let Some(file) = self.files[path_id as usize].as_mut() {
            file.update(time, position, insert, delete, &mut sink);
        }
    }

    /// Remove a file, recording the synthetic deletion of every surviving
    /// cohort in its history.
    pub fn delete_file(&mut self, path_id: PathId, time: TimeKey) {
        self.ensure_slot(path_id);
        if let Some(mut file) = self.files[path_id as usize].take() {
            let mut sink = FileDeltaSink {
                buffer: &mut self.deltas,
                codec: self.codec,
                track_files: self.track_files,
                path_id,
            };
            file.delete(time, &mut sink);
        }
        self.active_ids.remove(&path_id);
        self.deletions_by_id.insert(path_id);
    }

    /// Move a file (and its history) out of this shard, for rename routing.
    pub fn take_file(&mut self, path_id: PathId) -> Option<(File, SparseHistory)> {
        self.ensure_slot(path_id);
        let file = self.files[path_id as usize].take()?;
        self.active_ids.remove(&path_id);
        let history = std::mem::take(&mut self.file_histories[path_id as usize]);
        Some((file, history))
    }

    /// Install a file under a (renamed) id.
    pub fn install_file(&mut self, path_id: PathId, file: File, history: SparseHistory) {
        self.ensure_slot(path_id);
        self.files[path_id as usize] = Some(file);
        self.file_histories[path_id as usize] = history;
        self.active_ids.insert(path_id);
    }

    pub fn file(&self, path_id: PathId) -> Option<&File> {
        self.files.get(path_id as usize).and_then(Option::as_ref)
    }

    pub fn file_mut(&mut self, path_id: PathId) -> Option<&mut File> {
        self.files.get_mut(path_id as usize).and_then(Option::as_mut)
    }

    pub fn file_history(&self, path_id: PathId) -> Option<&SparseHistory> {
        self.file_histories.get(path_id as usize)
    }

    /// Take the commit's deltas, folding the per-file deltas into the
    /// shard's accumulated histories, and snapshot ownership when asked.
    pub fn take_deltas(&mut self, with_ownership: bool) -> ShardDeltas {
        let buffer = std::mem::take(&mut self.deltas);
        for (&path_id, history) in &buffer.files {
            self.ensure_slot(path_id);
            self.file_histories[path_id as usize].merge(history);
        }
        let ownership = if with_ownership {
            self.ownership_snapshot()
        } else {
            FxHashMap::default()
        };
        ShardDeltas {
            global: buffer.global,
            people: buffer.people,
            matrix: buffer.matrix,
            files: buffer.files,
            ownership,
        }
    }

    /// Lines attributed to each author, for every active file.
    pub fn ownership_snapshot(&self) -> FxHashMap<PathId, OwnershipMap> {
        let mut snapshot = FxHashMap::default();
        for &path_id in &self.active_ids {
            let Some(file) = self.file(path_id) else { continue };
            let mut owners = OwnershipMap::default();
            file.for_each(|_, length, value| {
                let (author, _) = self.codec.unpack(value);
                *owners.entry(author).or_insert(0) += length as i32;
            });
            snapshot.insert(path_id, owners);
        }
        snapshot
    }

    /// Conservative memory estimate: sparse entries plus timeline runs.
    pub fn estimated_size(&self) -> i64 {
        let history_entries: usize = self
            .file_histories
            .iter()
            .map(SparseHistory::entry_count)
            .sum();
        let segments: usize = self
            .active_ids
            .iter()
            .filter_map(|&id| self.file(id))
            .map(|f| f.segments().len())
            .sum();
        history_entries as i64 * SPARSE_ENTRY_BYTES + segments as i64 * 32
    }

    fn shard_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("shard_{:03}", self.index))
    }

    /// Write a full snapshot of every active file and nonempty history to
    /// `root/shard_NNN/files_{n}.json`, then free the in-memory state.
    pub fn spill_files(&mut self, root: &Path) -> Result<(), SpillError> {
        let dir = self.shard_dir(root);
        fs::create_dir_all(&dir).map_err(|source| SpillError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        let mut snapshot = ShardFilesSnapshot::default();
        let mut ids: Vec<PathId> = self.active_ids.iter().copied().collect();
        ids.sort_unstable();
        for &path_id in &ids {
            if let Some(file) = self.files[path_id as usize].take() {
                snapshot.files.push((path_id, file.segments()));
            }
            let history = std::mem::take(&mut self.file_histories[path_id as usize]);
            if !history.is_empty() {
                snapshot.file_histories.push((path_id, history));
            }
        }

        let path = dir.join(format!("files_{}.json", self.spill_n));
        let payload = serde_json::to_vec(&snapshot).map_err(|source| SpillError::Encode {
            what: "shard files",
            source,
        })?;
        fs::write(&path, payload).map_err(|source| SpillError::Write {
            path: path.display().to_string(),
            source,
        })?;
        self.spill_n += 1;
        debug!(shard = self.index, files = snapshot.files.len(), "spilled shard files");
        Ok(())
    }

    /// Restore the most recent spill. Only `files_{n-1}` is authoritative.
    pub fn restore_files(&mut self, root: &Path) -> Result<(), SpillError> {
        if self.spill_n == 0 {
            return Ok(());
        }
        let path = self
            .shard_dir(root)
            .join(format!("files_{}.json", self.spill_n - 1));
        let bytes = fs::read(&path).map_err(|source| SpillError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let snapshot: ShardFilesSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| SpillError::Decode {
                what: "shard files",
                path: path.display().to_string(),
                source,
            })?;
        for (path_id, segments) in snapshot.files {
            self.ensure_slot(path_id);
            self.files[path_id as usize] = Some(File::from_segments(&segments));
            self.active_ids.insert(path_id);
        }
        for (path_id, history) in snapshot.file_histories {
            self.ensure_slot(path_id);
            self.file_histories[path_id as usize] = history;
        }
        Ok(())
    }

    /// Reinstate bookkeeping from a checkpoint. File contents are restored
    /// separately by the spill mechanism.
    pub fn restore_marks(&mut self, active: Vec<PathId>, merged: Vec<PathId>) {
        self.active_ids = active.into_iter().collect();
        self.merged_by_id = merged.into_iter().collect();
        if let Some(&max) = self.active_ids.iter().max() {
            self.ensure_slot(max);
        }
    }

    /// Fork copy: same files and marks, fresh delta buffer.
    pub fn fork_clone(&self) -> Shard {
        Shard {
            index: self.index,
            codec: self.codec,
            track_files: self.track_files,
            files: self.files.clone(),
            file_histories: self.file_histories.clone(),
            active_ids: self.active_ids.clone(),
            merged_by_id: self.merged_by_id.clone(),
            deletions_by_id: self.deletions_by_id.clone(),
            deltas: DeltaBuffer::default(),
            spill_n: self.spill_n,
        }
    }
}
