//! Pre-computed chart data and survival metrics.
//!
//! Everything here is derived from aggregator state without materializing
//! dense per-file histories (there can be many files); only the global and
//! per-developer histories are densified, the latter one at a time.

use std::any::Any;

use serde::{Deserialize, Serialize};
use tracing::debug;

use burndown_core::cancel::CancellationToken;
use burndown_core::config::BurndownConfig;
use burndown_core::constants::{AUTHOR_MISSING, AUTHOR_SELF};
use burndown_core::errors::MetricsError;
use burndown_core::interning::PathInterner;
use burndown_core::traits::store::RecordWriter;
use burndown_core::types::history::{DenseHistory, Matrix};
use burndown_core::types::identifiers::AuthorId;

use crate::aggregator::Aggregator;

pub const CHART_DATA_KIND: &str = "chart_data";
pub const METRICS_KIND: &str = "metrics";

/// Pre-rendered chart payload: the dense global history plus the grid
/// parameters a renderer needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartData {
    pub global_history: DenseHistory,
    pub sampling: i32,
    pub granularity: i32,
    pub tick_size_ns: i64,
    pub end_time_unix_ns: i64,
}

/// Survival state of the whole codebase at one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSurvivalPoint {
    pub sample: usize,
    pub total_lines: i64,
    pub survival_rate: f64,
    /// The sample's row with negatives zeroed.
    pub band_breakdown: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub tracked_files: usize,
    pub tracked_developers: usize,
    pub analysis_period_days: f64,
    pub total_peak_lines: i64,
    pub total_current_lines: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSurvivalData {
    pub path: String,
    pub current_lines: i64,
    pub top_owner_id: AuthorId,
    pub top_owner_name: String,
    pub top_owner_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperSurvivalData {
    pub developer_id: AuthorId,
    pub developer_name: String,
    pub peak_lines: i64,
    pub current_lines: i64,
    pub survival_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEntry {
    pub author_id: AuthorId,
    pub author_name: String,
    /// Previous owner of the touched lines, or [`AUTHOR_SELF`].
    pub modifier_id: AuthorId,
    pub lines_modified: i64,
    pub is_self_modify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedMetrics {
    pub global_survival: Vec<GlobalSurvivalPoint>,
    pub aggregate: AggregateMetrics,
    pub file_survival: Vec<FileSurvivalData>,
    pub developer_survival: Vec<DeveloperSurvivalData>,
    pub interactions: Vec<InteractionEntry>,
}

/// Grid parameters and author names needed to render aggregator state.
#[derive(Debug, Clone)]
pub struct MetricsContext {
    pub sampling: i32,
    pub granularity: i32,
    pub tick_size_ns: i64,
    pub people: Vec<String>,
}

impl MetricsContext {
    pub fn from_config(config: &BurndownConfig) -> Self {
        Self {
            sampling: config.effective_sampling(),
            granularity: config.granularity,
            tick_size_ns: config.tick_size_nanos(),
            people: config.reversed_people_dict.clone(),
        }
    }

    fn author_name(&self, id: AuthorId) -> String {
        if id >= 0 {
            if let Some(name) = self.people.get(id as usize) {
                return name.clone();
            }
        }
        match id {
            AUTHOR_SELF => "self".to_string(),
            AUTHOR_MISSING => "unknown".to_string(),
            _ => format!("author {id}"),
        }
    }
}

/// Write the pre-rendered chart record and the computed metrics record for
/// an aggregator handed over as `&mut dyn Any`. Surfaces the type-mismatch
/// sentinel when the aggregator is not ours.
pub fn write_to_store_from_aggregator(
    aggregator: &mut dyn Any,
    ctx: &MetricsContext,
    interner: &PathInterner,
    writer: &mut dyn RecordWriter,
    cancel: &CancellationToken,
) -> Result<(), MetricsError> {
    let aggregator = aggregator
        .downcast_mut::<Aggregator>()
        .ok_or(MetricsError::AggregatorTypeMismatch)?;
    write_report(aggregator, ctx, interner, writer, cancel)
}

/// Typed entry point: collect spilled state, then stream the chart and
/// metrics records. The cancellation token is checked between major steps.
pub fn write_report(
    aggregator: &mut Aggregator,
    ctx: &MetricsContext,
    interner: &PathInterner,
    writer: &mut dyn RecordWriter,
    cancel: &CancellationToken,
) -> Result<(), MetricsError> {
    aggregator.collect()?;
    check(cancel)?;

    let chart = ChartData {
        global_history: aggregator
            .global()
            .group(aggregator.last_tick(), ctx.sampling, ctx.granularity),
        sampling: ctx.sampling,
        granularity: ctx.granularity,
        tick_size_ns: ctx.tick_size_ns,
        end_time_unix_ns: aggregator.end_time(),
    };
    write_record(writer, CHART_DATA_KIND, &chart)?;
    check(cancel)?;

    let metrics = compute_metrics(aggregator, ctx, interner, cancel)?;
    write_record(writer, METRICS_KIND, &metrics)?;
    debug!(
        samples = chart.global_history.len(),
        files = metrics.file_survival.len(),
        "report written"
    );
    Ok(())
}

/// Compute every metric category from aggregator state.
pub fn compute_metrics(
    aggregator: &Aggregator,
    ctx: &MetricsContext,
    interner: &PathInterner,
    cancel: &CancellationToken,
) -> Result<ComputedMetrics, MetricsError> {
    let dense_global = aggregator
        .global()
        .group(aggregator.last_tick(), ctx.sampling, ctx.granularity);

    let (global_survival, total_peak_lines) = global_survival(&dense_global);
    check(cancel)?;

    let total_current_lines = dense_global.last().map_or(0, |row| sum_positive(row));
    let num_samples = dense_global.len();
    let period_ticks = num_samples.saturating_sub(1) as f64 * ctx.sampling as f64;
    let aggregate = AggregateMetrics {
        tracked_files: aggregator.files().len().max(aggregator.file_ownership().len()),
        tracked_developers: aggregator.people().len(),
        analysis_period_days: period_ticks * ctx.tick_size_ns as f64 / 86_400e9,
        total_peak_lines,
        total_current_lines,
    };
    check(cancel)?;

    let file_survival = file_survival(aggregator, ctx, interner);
    check(cancel)?;

    let developer_survival = developer_survival(aggregator, ctx);
    check(cancel)?;

    let interactions = interactions(aggregator.matrix(), ctx);

    Ok(ComputedMetrics {
        global_survival,
        aggregate,
        file_survival,
        developer_survival,
        interactions,
    })
}

fn check(cancel: &CancellationToken) -> Result<(), MetricsError> {
    if cancel.is_cancelled() {
        Err(MetricsError::Cancelled)
    } else {
        Ok(())
    }
}

fn write_record<T: Serialize>(
    writer: &mut dyn RecordWriter,
    kind: &'static str,
    value: &T,
) -> Result<(), MetricsError> {
    let payload =
        serde_json::to_vec(value).map_err(|source| MetricsError::Encode { kind, source })?;
    writer.write(kind, &payload).map_err(|source| MetricsError::Store {
        kind: kind.to_string(),
        source,
    })
}

fn sum_positive(row: &[i64]) -> i64 {
    row.iter().filter(|&&v| v > 0).sum()
}

/// Per-band peak across all samples, never negative.
fn band_peaks(dense: &DenseHistory) -> Vec<i64> {
    let bands = dense.first().map_or(0, Vec::len);
    (0..bands)
        .map(|b| dense.iter().map(|row| row[b]).max().unwrap_or(0).max(0))
        .collect()
}

/// The peak denominator: the sum over bands of each band's all-time peak.
/// This is total lines ever written, not the current line count.
fn global_survival(dense: &DenseHistory) -> (Vec<GlobalSurvivalPoint>, i64) {
    let peaks = band_peaks(dense);
    let total_peak: i64 = peaks.iter().sum();
    let points = dense
        .iter()
        .enumerate()
        .map(|(sample, row)| {
            let total = sum_positive(row);
            GlobalSurvivalPoint {
                sample,
                total_lines: total,
                survival_rate: if total_peak > 0 {
                    total as f64 / total_peak as f64
                } else {
                    0.0
                },
                band_breakdown: row.iter().map(|&v| v.max(0)).collect(),
            }
        })
        .collect();
    (points, total_peak)
}

fn file_survival(
    aggregator: &Aggregator,
    ctx: &MetricsContext,
    interner: &PathInterner,
) -> Vec<FileSurvivalData> {
    let mut path_ids: Vec<_> = aggregator.file_ownership().keys().copied().collect();
    path_ids.sort_unstable();

    let mut out = Vec::with_capacity(path_ids.len());
    for path_id in path_ids {
        let owners = &aggregator.file_ownership()[&path_id];
        let current: i64 = owners.values().map(|&c| c as i64).sum();
        if current <= 0 {
            continue;
        }
        let mut ranked: Vec<(AuthorId, i32)> = owners.iter().map(|(&a, &c)| (a, c)).collect();
        ranked.sort_by_key(|&(author, count)| (std::cmp::Reverse(count), author));
        let (top_owner_id, top_lines) = ranked[0];
        out.push(FileSurvivalData {
            path: interner.lookup_or_empty(path_id).to_string(),
            current_lines: current,
            top_owner_id,
            top_owner_name: ctx.author_name(top_owner_id),
            top_owner_pct: 100.0 * top_lines as f64 / current as f64,
        });
    }
    out
}

/// One developer at a time: materialize their personal history to dense,
/// take peak and current, discard.
fn developer_survival(aggregator: &Aggregator, ctx: &MetricsContext) -> Vec<DeveloperSurvivalData> {
    let mut authors: Vec<_> = aggregator.people().keys().copied().collect();
    authors.sort_unstable();

    let mut out = Vec::with_capacity(authors.len());
    for author in authors {
        let dense = aggregator.people()[&author].group(
            aggregator.last_tick(),
            ctx.sampling,
            ctx.granularity,
        );
        let peak_lines: i64 = band_peaks(&dense).iter().sum();
        let current_lines = dense.last().map_or(0, |row| sum_positive(row));
        out.push(DeveloperSurvivalData {
            developer_id: author,
            developer_name: ctx.author_name(author),
            peak_lines,
            current_lines,
            survival_rate: if peak_lines > 0 {
                current_lines as f64 / peak_lines as f64
            } else {
                0.0
            },
        });
    }
    out
}

/// Dense interaction matrix of width `num_authors + 2`: column 0 is SELF,
/// column 1 is reserved for unknown authorship, columns 2+ are authors by
/// id. One entry per nonzero cell.
fn interactions(matrix: &Matrix, ctx: &MetricsContext) -> Vec<InteractionEntry> {
    let max_col = matrix
        .rows()
        .iter()
        .flat_map(|row| row.keys().copied())
        .max()
        .unwrap_or(-1);
    let num_authors = matrix
        .row_count()
        .max((max_col + 1).max(0) as usize)
        .max(ctx.people.len());
    let width = num_authors + 2;

    let mut dense = vec![vec![0i64; width]; matrix.row_count()];
    for (author, row) in matrix.rows().iter().enumerate() {
        for (&col, &count) in row {
            let c = (col + 2) as usize;
            if c < width {
                dense[author][c] = count;
            }
        }
    }

    let mut out = Vec::new();
    for (author, row) in dense.iter().enumerate() {
        for (c, &count) in row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let modifier_id = c as AuthorId - 2;
            out.push(InteractionEntry {
                author_id: author as AuthorId,
                author_name: ctx.author_name(author as AuthorId),
                modifier_id,
                lines_modified: count,
                is_self_modify: modifier_id == AUTHOR_SELF,
            });
        }
    }
    out
}
