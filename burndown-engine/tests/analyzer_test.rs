//! Analyzer integration tests: commit processing, renames, deletions,
//! fork/merge, checkpointing, and hibernation.

use burndown_core::config::BurndownConfig;
use burndown_engine::HistoryAnalyzer;

fn two_author_config() -> BurndownConfig {
    let mut config = BurndownConfig::default();
    config.track_files = true;
    config.track_people = true;
    config.people_count = 2;
    config.reversed_people_dict = vec!["Alice".to_string(), "Bob".to_string()];
    config.workers = 2;
    config
}

fn analyzer() -> HistoryAnalyzer {
    burndown_core::tracing::init("warn");
    let mut analyzer = HistoryAnalyzer::with_config(two_author_config());
    analyzer.initialize().unwrap();
    analyzer
}

#[test]
fn single_file_two_authors_scenario() {
    let mut analyzer = analyzer();
    let file = analyzer.intern_path("src/main.go");

    // Tick 0, author 0 writes a 1000-line file.
    analyzer.set_tick(0);
    analyzer.on_new_tick();
    analyzer.update(file, 0, 0, 0, 1000).unwrap();
    analyzer.collect_deltas().unwrap();

    // Tick 30, author 1 inserts 50 lines and deletes 30 old ones.
    analyzer.set_tick(30);
    analyzer.on_new_tick();
    analyzer.update(file, 1, 100, 0, 50).unwrap();
    analyzer.update(file, 1, 200, 30, 0).unwrap();
    let at_30 = analyzer.collect_deltas().unwrap();
    assert!(!at_30.global.is_empty(), "tick 30 left no global deltas");

    // Tick 60, author 0 inserts 100 lines.
    analyzer.set_tick(60);
    analyzer.on_new_tick();
    analyzer.update(file, 0, 500, 0, 100).unwrap();
    let at_60 = analyzer.collect_deltas().unwrap();
    assert!(!at_60.global.is_empty(), "tick 60 left no global deltas");

    let ownership = at_60.file_ownership.as_ref().unwrap();
    let owners = &ownership[&file];
    // 1000 - 30 deleted + 100 new for author 0; the 50 inserted at tick 30
    // stay with author 1.
    assert_eq!(owners[&0], 1070);
    assert_eq!(owners[&1], 50);
    let total: i32 = owners.values().sum();
    assert_eq!(total, 1120);
}

#[test]
fn fork_is_independent_of_parent_and_siblings() {
    let mut parent = analyzer();
    let file = parent.intern_path("lib.rs");
    parent.set_tick(0);
    parent.on_new_tick();
    parent.update(file, 0, 0, 0, 100).unwrap();
    parent.collect_deltas().unwrap();

    let mut forks = parent.fork(2);
    forks[0].set_tick(1);
    forks[0].on_new_tick();
    forks[0].update(file, 1, 0, 50, 0).unwrap();
    let mutated = forks[0].collect_deltas().unwrap();
    assert!(!mutated.global.is_empty());

    // Sibling and parent still see the original 100 lines.
    for other in [&mut forks[1], &mut parent] {
        other.set_tick(1);
        other.on_new_tick();
        other.update(file, 0, 0, 0, 0).unwrap();
        let snapshot = other.collect_deltas().unwrap();
        let owners = &snapshot.file_ownership.as_ref().unwrap()[&file];
        assert_eq!(owners[&0], 100);
    }
}

#[test]
fn forks_share_the_interner() {
    let parent = analyzer();
    let forks = parent.fork(2);
    let id = parent.intern_path("shared/path.c");
    assert_eq!(forks[0].intern_path("shared/path.c"), id);
    assert_eq!(forks[1].intern_path("shared/path.c"), id);
    assert!(parent.interner().shares_storage_with(forks[0].interner()));
}

#[test]
fn merge_unions_renames_and_advances_the_clock() {
    let mut parent = analyzer();
    let file = parent.intern_path("old.go");
    parent.set_tick(0);
    parent.on_new_tick();
    parent.update(file, 0, 0, 0, 10).unwrap();
    parent.collect_deltas().unwrap();

    let mut forks = parent.fork(2);
    forks[0].set_tick(5);
    forks[0].rename("old.go", "new.go").unwrap();
    forks[1].set_tick(9);

    parent.merge(forks.drain(..).collect());
    assert_eq!(parent.tick(), 9);

    // The union carried the fork's rename: updates to the old path land on
    // the renamed file.
    parent.on_new_tick();
    parent.update(file, 1, 0, 0, 5).unwrap();
    let result = parent.collect_deltas().unwrap();
    assert!(!result.global.is_empty());
}

#[test]
fn rename_moves_ownership_to_the_new_id() {
    let mut analyzer = analyzer();
    let old_id = analyzer.intern_path("before.rs");
    analyzer.set_tick(0);
    analyzer.on_new_tick();
    analyzer.update(old_id, 0, 0, 0, 40).unwrap();
    analyzer.collect_deltas().unwrap();

    analyzer.set_tick(1);
    analyzer.on_new_tick();
    analyzer.rename("before.rs", "after.rs").unwrap();
    let new_id = analyzer.intern_path("after.rs");
    analyzer.update(old_id, 1, 0, 0, 2).unwrap(); // stale id still routes
    let result = analyzer.collect_deltas().unwrap();

    let ownership = result.file_ownership.unwrap();
    assert!(ownership.contains_key(&new_id));
    assert!(!ownership.contains_key(&old_id));
    let owners = &ownership[&new_id];
    assert_eq!((owners[&0], owners[&1]), (40, 2));
}

#[test]
fn delete_file_emits_negative_cohorts() {
    let mut analyzer = analyzer();
    let file = analyzer.intern_path("gone.py");
    analyzer.set_tick(0);
    analyzer.on_new_tick();
    analyzer.update(file, 0, 0, 0, 25).unwrap();
    analyzer.collect_deltas().unwrap();

    analyzer.set_tick(3);
    analyzer.on_new_tick();
    analyzer.delete_file("gone.py").unwrap();
    let result = analyzer.collect_deltas().unwrap();

    let dense = result.files[&file].group(3, 1, 1);
    assert_eq!(dense[3][0], -25);
    assert!(result.file_ownership.unwrap().is_empty());
}

#[test]
fn merge_commits_attribute_insertions_to_the_merge_author() {
    let mut analyzer = analyzer();
    let file = analyzer.intern_path("merged.ts");
    analyzer.set_tick(0);
    analyzer.on_new_tick();
    analyzer.on_merge();
    analyzer.update(file, 0, 0, 0, 10).unwrap();
    let result = analyzer.collect_deltas().unwrap();

    // people_count == 2, so the synthetic merge author is id 2.
    let owners = &result.file_ownership.unwrap()[&file];
    assert_eq!(owners[&2], 10);
    assert!(result.people.contains_key(&2));

    // A new tick clears the sentinel.
    analyzer.set_tick(1);
    analyzer.on_new_tick();
    analyzer.update(file, 0, 0, 0, 5).unwrap();
    let result = analyzer.collect_deltas().unwrap();
    let owners = &result.file_ownership.unwrap()[&file];
    assert_eq!(owners[&0], 5);
}

#[test]
fn checkpoint_round_trip_restores_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    let mut analyzer = analyzer();
    let file = analyzer.intern_path("ck.rs");
    analyzer.set_tick(4);
    analyzer.on_new_tick();
    analyzer.set_tick(7);
    analyzer.update(file, 0, 0, 0, 12).unwrap();
    analyzer.rename("ck.rs", "ck2.rs").unwrap();
    analyzer.collect_deltas().unwrap();
    analyzer.save_checkpoint(dir.path()).unwrap();

    let mut restored = HistoryAnalyzer::with_config(two_author_config());
    restored.initialize().unwrap();
    restored.load_checkpoint(dir.path()).unwrap();

    assert_eq!(restored.tick(), 7);
    assert_eq!(restored.previous_tick(), 4);
    assert_eq!(restored.interner().snapshot(), analyzer.interner().snapshot());
    assert_eq!(
        restored.config().reversed_people_dict,
        vec!["Alice".to_string(), "Bob".to_string()]
    );
}

#[test]
fn hibernation_spills_and_wakes_transparently() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = two_author_config();
    config.hibernation_to_disk = true;
    config.hibernation_threshold = 1;
    config.hibernation_dir = Some(dir.path().to_path_buf());
    let mut analyzer = HistoryAnalyzer::with_config(config);
    analyzer.initialize().unwrap();

    let file = analyzer.intern_path("big.c");
    analyzer.set_tick(0);
    analyzer.on_new_tick();
    analyzer.update(file, 0, 0, 0, 500).unwrap();
    analyzer.collect_deltas().unwrap(); // exceeds the 1-byte threshold

    // The next update wakes the shards from disk; content survives.
    analyzer.set_tick(1);
    analyzer.on_new_tick();
    analyzer.update(file, 1, 0, 100, 0).unwrap();
    let result = analyzer.collect_deltas().unwrap();
    let owners = &result.file_ownership.unwrap()[&file];
    assert_eq!(owners[&0], 400);
}
