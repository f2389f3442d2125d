//! Metrics tests: survival computations, the interaction matrix, and the
//! end-to-end path from analyzer through aggregator into the record store.

use burndown_core::cancel::CancellationToken;
use burndown_core::config::BurndownConfig;
use burndown_core::errors::MetricsError;
use burndown_core::interning::PathInterner;
use burndown_core::traits::store::RecordStore;
use burndown_core::types::collections::FxHashMap;
use burndown_core::types::history::{CommitEvent, CommitPayload};
use burndown_engine::aggregator::Aggregator;
use burndown_engine::metrics::{
    compute_metrics, write_report, write_to_store_from_aggregator, ChartData, ComputedMetrics,
    MetricsContext, CHART_DATA_KIND, METRICS_KIND,
};
use burndown_engine::HistoryAnalyzer;
use burndown_store::SqliteRecordStore;

fn config() -> BurndownConfig {
    let mut config = BurndownConfig::default();
    config.granularity = 1;
    config.sampling = 1;
    config.track_files = true;
    config.track_people = true;
    config.people_count = 2;
    config.reversed_people_dict = vec!["Alice".to_string(), "Bob".to_string()];
    config
}

/// Drive a small two-author history and return the populated aggregator.
fn populated_aggregator() -> (Aggregator, HistoryAnalyzer) {
    let mut analyzer = HistoryAnalyzer::with_config(config());
    analyzer.initialize().unwrap();
    let file = analyzer.intern_path("main.go");

    let mut agg = Aggregator::new();
    analyzer.set_tick(0);
    analyzer.on_new_tick();
    analyzer.update(file, 0, 0, 0, 70).unwrap();
    analyzer.update(file, 1, 70, 0, 30).unwrap();
    let result = analyzer.collect_deltas().unwrap();
    agg.add(&CommitEvent {
        data: CommitPayload::Commit(result),
        tick: 0,
        timestamp: 1_700_000_000_000_000_000,
    })
    .unwrap();

    analyzer.set_tick(1);
    analyzer.on_new_tick();
    analyzer.update(file, 0, 0, 10, 0).unwrap();
    let result = analyzer.collect_deltas().unwrap();
    agg.add(&CommitEvent {
        data: CommitPayload::Commit(result),
        tick: 1,
        timestamp: 1_700_086_400_000_000_000,
    })
    .unwrap();

    (agg, analyzer)
}

#[test]
fn file_survival_from_ownership() {
    let (agg, analyzer) = populated_aggregator();
    let ctx = MetricsContext::from_config(analyzer.config());
    let metrics =
        compute_metrics(&agg, &ctx, analyzer.interner(), &CancellationToken::new()).unwrap();

    assert_eq!(metrics.file_survival.len(), 1);
    let file = &metrics.file_survival[0];
    assert_eq!(file.path, "main.go");
    assert_eq!(file.current_lines, 90);
    assert_eq!(file.top_owner_id, 0);
    assert_eq!(file.top_owner_name, "Alice");
    assert!((file.top_owner_pct - 100.0 * 60.0 / 90.0).abs() < 1e-9);
}

#[test]
fn developer_survival_streams_per_author() {
    let (agg, analyzer) = populated_aggregator();
    let ctx = MetricsContext::from_config(analyzer.config());
    let metrics =
        compute_metrics(&agg, &ctx, analyzer.interner(), &CancellationToken::new()).unwrap();

    assert_eq!(metrics.developer_survival.len(), 2);
    let alice = &metrics.developer_survival[0];
    assert_eq!(alice.developer_name, "Alice");
    assert_eq!(alice.peak_lines, 70);
    assert_eq!(alice.current_lines, 60);
    let bob = &metrics.developer_survival[1];
    assert_eq!((bob.peak_lines, bob.current_lines), (30, 30));
    assert!((bob.survival_rate - 1.0).abs() < 1e-9);
}

#[test]
fn forward_fill_keeps_untouched_bands() {
    let (agg, _analyzer) = populated_aggregator();
    let dense = agg.global().group(agg.last_tick(), 1, 1);
    // Sample 1 only removed 10 lines of band 0; band totals never grow on
    // their own.
    assert_eq!(dense[0][0], 100);
    assert_eq!(dense[1][0], 90);
    for band in 0..dense[0].len() {
        assert!(dense[1][band] <= dense[0][band] || dense[0][band] == 0);
    }
}

#[test]
fn survival_rate_bounded_by_peak_denominator() {
    let (agg, analyzer) = populated_aggregator();
    let ctx = MetricsContext::from_config(analyzer.config());
    let metrics =
        compute_metrics(&agg, &ctx, analyzer.interner(), &CancellationToken::new()).unwrap();

    assert_eq!(metrics.aggregate.total_peak_lines, 100);
    assert_eq!(metrics.aggregate.total_current_lines, 90);
    for point in &metrics.global_survival {
        assert!(point.survival_rate <= 1.0);
    }
}

#[test]
fn report_written_to_sqlite_store_round_trips() {
    let (mut agg, analyzer) = populated_aggregator();
    let ctx = MetricsContext::from_config(analyzer.config());
    let store = SqliteRecordStore::open_in_memory().unwrap();
    let meta: FxHashMap<String, String> =
        [("engine".to_string(), "burndown".to_string())].into_iter().collect();

    {
        let mut writer = store.begin("repo", &meta).unwrap();
        write_report(
            &mut agg,
            &ctx,
            analyzer.interner(),
            writer.as_mut(),
            &CancellationToken::new(),
        )
        .unwrap();
        writer.finish().unwrap();
    }

    let reader = store.open("repo").unwrap();
    assert_eq!(reader.kinds().unwrap(), vec![CHART_DATA_KIND, METRICS_KIND]);

    let mut charts = Vec::new();
    reader
        .for_each(CHART_DATA_KIND, &mut |bytes| {
            charts.push(serde_json::from_slice::<ChartData>(bytes).unwrap());
        })
        .unwrap();
    assert_eq!(charts.len(), 1);
    assert_eq!(charts[0].sampling, 1);
    assert_eq!(charts[0].global_history[0][0], 100);
    assert_eq!(charts[0].end_time_unix_ns, 1_700_086_400_000_000_000);

    let mut metrics = Vec::new();
    reader
        .for_each(METRICS_KIND, &mut |bytes| {
            metrics.push(serde_json::from_slice::<ComputedMetrics>(bytes).unwrap());
        })
        .unwrap();
    assert_eq!(metrics[0].file_survival[0].path, "main.go");
    assert!(!metrics[0].interactions.is_empty());
}

#[test]
fn writer_collects_spilled_state_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut analyzer = HistoryAnalyzer::with_config(config());
    analyzer.initialize().unwrap();
    let file = analyzer.intern_path("spilled.rs");
    analyzer.set_tick(0);
    analyzer.on_new_tick();
    analyzer.update(file, 0, 0, 0, 40).unwrap();
    let result = analyzer.collect_deltas().unwrap();

    let mut agg = Aggregator::with_spill(dir.path().to_path_buf(), 1);
    agg.add(&CommitEvent {
        data: CommitPayload::Commit(result),
        tick: 0,
        timestamp: 0,
    })
    .unwrap();
    assert!(agg.global().is_empty(), "budget of 1 byte must force a spill");

    let ctx = MetricsContext::from_config(analyzer.config());
    let store = SqliteRecordStore::open_in_memory().unwrap();
    let mut writer = store.begin("spilled", &FxHashMap::default()).unwrap();
    write_report(
        &mut agg,
        &ctx,
        analyzer.interner(),
        writer.as_mut(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(agg.global().group(0, 1, 1), vec![vec![40]]);
}

#[test]
fn type_mismatch_is_a_sentinel_error() {
    let ctx = MetricsContext::from_config(&config());
    let interner = PathInterner::new();
    let store = SqliteRecordStore::open_in_memory().unwrap();
    let mut writer = store.begin("x", &FxHashMap::default()).unwrap();
    let mut not_an_aggregator = 42u64;

    let err = write_to_store_from_aggregator(
        &mut not_an_aggregator,
        &ctx,
        &interner,
        writer.as_mut(),
        &CancellationToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, MetricsError::AggregatorTypeMismatch));
}

#[test]
fn cancellation_stops_between_steps() {
    let (mut agg, analyzer) = populated_aggregator();
    let ctx = MetricsContext::from_config(analyzer.config());
    let store = SqliteRecordStore::open_in_memory().unwrap();
    let mut writer = store.begin("c", &FxHashMap::default()).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = write_report(&mut agg, &ctx, analyzer.interner(), writer.as_mut(), &token)
        .unwrap_err();
    assert!(matches!(err, MetricsError::Cancelled));
}
