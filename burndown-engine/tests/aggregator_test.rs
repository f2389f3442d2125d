//! Aggregator tests: additive merging, ownership snapshot semantics,
//! deep-clone flushes, and the spill/collect round trip.

use burndown_core::types::collections::FxHashMap;
use burndown_core::types::history::{
    CommitEvent, CommitPayload, CommitResult, OwnershipMap, SparseHistory, TickPayload,
};
use burndown_engine::Aggregator;

fn event(tick: i32, build: impl FnOnce(&mut CommitResult)) -> CommitEvent {
    let mut result = CommitResult::default();
    build(&mut result);
    CommitEvent {
        data: CommitPayload::Commit(result),
        tick,
        timestamp: tick as i64 * 86_400_000_000_000,
    }
}

fn ownership(entries: &[(u32, &[(i32, i32)])]) -> FxHashMap<u32, OwnershipMap> {
    entries
        .iter()
        .map(|&(path, owners)| (path, owners.iter().copied().collect()))
        .collect()
}

#[test]
fn add_merges_histories_additively() {
    let mut agg = Aggregator::new();
    agg.add(&event(0, |r| r.global.add(0, 0, 100))).unwrap();
    agg.add(&event(1, |r| {
        r.global.add(1, 0, -50);
        r.global.add(1, 1, 200);
    }))
    .unwrap();

    assert_eq!(agg.last_tick(), 1);
    let dense = agg.global().group(1, 1, 1);
    assert_eq!(dense, vec![vec![100, 0], vec![50, 200]]);
}

#[test]
fn ownership_is_a_snapshot_not_a_sum() {
    let mut agg = Aggregator::new();
    agg.add(&event(0, |r| {
        r.file_ownership = Some(ownership(&[(0, &[(0, 70)])]));
    }))
    .unwrap();
    agg.add(&event(1, |r| {
        r.file_ownership = Some(ownership(&[(0, &[(0, 30), (1, 10)])]));
    }))
    .unwrap();

    let owners = &agg.file_ownership()[&0];
    assert_eq!(owners.len(), 2);
    assert_eq!((owners[&0], owners[&1]), (30, 10));
}

#[test]
fn flush_tick_returns_a_deep_clone() {
    let mut agg = Aggregator::new();
    agg.add(&event(2, |r| r.global.add(2, 0, 10))).unwrap();

    let flushed = agg.flush_tick(2);
    let TickPayload::Tick(mut snapshot) = flushed.data;
    snapshot.global.add(9, 9, 999);
    snapshot.file_ownership.insert(7, OwnershipMap::default());

    assert_eq!(agg.global().entry_count(), 1);
    assert!(agg.file_ownership().is_empty());
    assert_eq!(agg.flush_all_ticks().len(), 1);
}

#[test]
fn auto_spill_on_a_tiny_budget() {
    let dir = tempfile::tempdir().unwrap();
    let mut agg = Aggregator::with_spill(dir.path().to_path_buf(), 1);

    agg.add(&event(0, |r| r.global.add(0, 0, 100))).unwrap();
    assert_eq!(agg.spill_count(), 1);
    assert!(agg.global().is_empty(), "state must be freed after a spill");

    agg.collect().unwrap();
    assert_eq!(agg.spill_count(), 0);
    let dense = agg.global().group(0, 1, 1);
    assert_eq!(dense, vec![vec![100]]);
}

#[test]
fn spill_collect_round_trip_preserves_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut agg = Aggregator::with_spill(dir.path().to_path_buf(), i64::MAX);

    agg.add(&event(0, |r| {
        r.global.add(0, 0, 100);
        r.people.insert(0, {
            let mut h = SparseHistory::new();
            h.add(0, 0, 100);
            h
        });
        r.matrix.record(0, -2, 100);
        r.files.insert(3, {
            let mut h = SparseHistory::new();
            h.add(0, 0, 100);
            h
        });
        r.file_ownership = Some(ownership(&[(3, &[(0, 100)])]));
    }))
    .unwrap();
    agg.add(&event(5, |r| r.global.add(5, 0, -25))).unwrap();

    let before = agg.flush_tick(5);
    agg.spill().unwrap();
    assert!(agg.global().is_empty());
    agg.collect().unwrap();
    let after = agg.flush_tick(5);

    let TickPayload::Tick(before) = before.data;
    let TickPayload::Tick(after) = after.data;
    assert_eq!(before.global, after.global);
    assert_eq!(before.people, after.people);
    assert_eq!(before.matrix, after.matrix);
    assert_eq!(before.files, after.files);
    assert_eq!(before.file_ownership, after.file_ownership);
}

#[test]
fn collect_across_multiple_spills_keeps_newest_ownership() {
    let dir = tempfile::tempdir().unwrap();
    let mut agg = Aggregator::with_spill(dir.path().to_path_buf(), i64::MAX);

    agg.add(&event(0, |r| {
        r.global.add(0, 0, 10);
        r.file_ownership = Some(ownership(&[(0, &[(0, 10)])]));
    }))
    .unwrap();
    agg.spill().unwrap();

    agg.add(&event(1, |r| {
        r.global.add(1, 0, 5);
        r.file_ownership = Some(ownership(&[(0, &[(0, 15)])]));
    }))
    .unwrap();
    agg.spill().unwrap();
    assert_eq!(agg.spill_count(), 2);

    agg.collect().unwrap();
    // Histories sum across spills; ownership comes from the newest only.
    let dense = agg.global().group(1, 1, 1);
    assert_eq!(dense, vec![vec![10], vec![15]]);
    assert_eq!(agg.file_ownership()[&0][&0], 15);
}

#[test]
fn spill_state_handoff() {
    let dir = tempfile::tempdir().unwrap();
    let mut agg = Aggregator::with_spill(dir.path().to_path_buf(), i64::MAX);
    agg.add(&event(0, |r| r.global.add(0, 0, 42))).unwrap();
    agg.spill().unwrap();
    let info = agg.spill_state().unwrap();

    let mut adopted = Aggregator::new();
    adopted.restore_spill_state(info);
    adopted.collect().unwrap();
    assert_eq!(adopted.global().group(0, 1, 1), vec![vec![42]]);
}
