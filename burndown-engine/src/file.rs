//! A tracked file: a line timeline plus its lazy range index.
//!
//! Every edit fans out to the timeline, to the caller-supplied delta sink
//! (so per-tick histograms are maintained without re-walking the tree), and
//! invalidates the index.

use burndown_core::types::timekey::TimeKey;

use crate::timeline::{OwnedRange, RangeIndex, Segment, Timeline};

/// Observer of line-ownership changes. For a deletion the sink receives
/// `(new_time, previous_time, -overlap)` per touched previous key; for an
/// insertion it receives `(new_time, new_time, +inserted)`.
pub trait DeltaSink {
    fn record(&mut self, time: TimeKey, previous_time: TimeKey, delta: i64);
}

/// Sink that discards events. Used where history tracking is off.
#[derive(Debug, Default)]
pub struct NullSink;

impl DeltaSink for NullSink {
    fn record(&mut self, _time: TimeKey, _previous_time: TimeKey, _delta: i64) {}
}

/// A file's surviving lines keyed by time of authorship.
#[derive(Debug, Clone)]
pub struct File {
    timeline: Timeline,
    index: RangeIndex,
}

impl File {
    /// New file born as `length` lines keyed `time`. The birth event is
    /// reported through the sink like any other insertion.
    pub fn new(time: TimeKey, length: u32, sink: &mut dyn DeltaSink) -> Self {
        if length > 0 {
            sink.record(time, time, length as i64);
        }
        Self {
            timeline: Timeline::with_segment(time, length),
            index: RangeIndex::new(),
        }
    }

    /// Rebuild from a spill snapshot. No events are emitted; the histories
    /// these lines contributed to were snapshotted alongside.
    pub fn from_segments(segments: &[Segment]) -> Self {
        Self {
            timeline: Timeline::from_segments(segments),
            index: RangeIndex::new(),
        }
    }

    /// Delete `delete` lines at `position`, insert `insert` lines keyed
    /// `time`, reporting every ownership change. Returns the net line delta.
    pub fn update(
        &mut self,
        time: TimeKey,
        position: u32,
        insert: u32,
        delete: u32,
        sink: &mut dyn DeltaSink,
    ) -> i64 {
        if delete > 0 {
            self.timeline
                .for_each_in(position, position.saturating_add(delete), &mut |overlap, previous| {
                    sink.record(time, previous, -(overlap as i64));
                });
        }
        self.timeline.replace(position, delete, insert, time);
        if insert > 0 {
            sink.record(time, time, insert as i64);
        }
        self.index.mark_dirty();
        insert as i64 - delete as i64
    }

    /// Remove all content, reporting the deletions. The caller drops the
    /// file afterwards.
    pub fn delete(&mut self, time: TimeKey, sink: &mut dyn DeltaSink) {
        let len = self.timeline.len();
        self.update(time, 0, 0, len, sink);
        self.timeline.erase();
    }

    /// Runs overlapping `[start_line, end_line)`.
    pub fn query_range(&mut self, start_line: u32, end_line: u32) -> Vec<OwnedRange> {
        self.index.query(&self.timeline, start_line, end_line)
    }

    pub fn len(&self) -> u32 {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    pub fn segments(&self) -> Vec<Segment> {
        self.timeline.segments()
    }

    /// Visit every run as `(offset, length, value)`, sentinel excluded.
    pub fn for_each(&self, mut visitor: impl FnMut(u32, u32, TimeKey)) {
        self.timeline.iterate(|offset, length, value| {
            if length > 0 && value != burndown_core::constants::TREE_END {
                visitor(offset, length, value);
            }
        });
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}
