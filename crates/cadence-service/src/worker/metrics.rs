//! Periodic aggregation of request performance snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::constants::DEFAULT_METRICS_WINDOW_MINUTES;

/// Per-operation timings within one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub count: u64,
    pub ms: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowOperation {
    pub op: String,
    pub ms: f64,
}

/// Performance record of a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfSnapshot {
    pub total_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub ops: BTreeMap<String, OperationStats>,
    pub slow: Vec<SlowOperation>,
    pub complexity_score: Option<f64>,
}

/// Source of recent snapshots, most recent first.
pub trait SnapshotProvider: Send + Sync {
    /// ## Errors
    /// Returns an error if the snapshots cannot be read.
    fn recent_snapshots(
        &self,
        window_minutes: u32,
        max_snapshots: usize,
    ) -> anyhow::Result<Vec<PerfSnapshot>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOptions {
    pub window_minutes: u32,
    pub max_snapshots: usize,
    pub slow_threshold_ms: f64,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_METRICS_WINDOW_MINUTES,
            max_snapshots: 1000,
            slow_threshold_ms: 200.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_ops: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedMetrics {
    pub timestamp: DateTime<Utc>,
    pub window_minutes: u32,
    pub snapshot_count: usize,
    pub operations: BTreeMap<String, OperationMetrics>,
    pub cache: CacheMetrics,
    pub slow_operation_count: usize,
    pub avg_total_ms: f64,
    pub min_total_ms: f64,
    pub max_total_ms: f64,
    pub median_total_ms: f64,
    pub p95_total_ms: f64,
    pub p99_total_ms: f64,
    pub avg_complexity_score: Option<f64>,
}

impl AggregatedMetrics {
    #[must_use]
    pub fn empty(window_minutes: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            window_minutes,
            snapshot_count: 0,
            operations: BTreeMap::new(),
            cache: CacheMetrics::default(),
            slow_operation_count: 0,
            avg_total_ms: 0.0,
            min_total_ms: 0.0,
            max_total_ms: 0.0,
            median_total_ms: 0.0,
            p95_total_ms: 0.0,
            p99_total_ms: 0.0,
            avg_complexity_score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsAggregationResult {
    pub metrics: AggregatedMetrics,
    pub snapshots_processed: usize,
    pub aggregation_duration_ms: u64,
}

/// ## Summary
/// Percentile of an ascending slice, interpolating linearly between the closest ranks.
/// `percentile` is clamped to 0..=100. `None` for an empty slice.
#[must_use]
pub fn calculate_percentile(sorted: &[f64], percentile: f64) -> Option<f64> {
    let (first, last) = (sorted.first()?, sorted.len() - 1);
    if last == 0 {
        return Some(*first);
    }

    let rank = percentile.clamp(0.0, 100.0) / 100.0 * count_as_f64(last);
    let lower = rank.floor();
    let weight = rank - lower;
    let lower_value = sorted.get(index_from(lower))?;
    let upper_value = sorted.get(index_from(rank.ceil()))?;

    Some(lower_value + weight * (upper_value - lower_value))
}

fn count_as_f64(count: usize) -> f64 {
    f64::from(u32::try_from(count).unwrap_or(u32::MAX))
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn index_from(rank: f64) -> usize {
    rank.max(0.0) as usize
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn valid(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn sorted_valid(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.into_iter().filter(|v| valid(*v)).collect();
    values.sort_by(f64::total_cmp);
    values
}

fn percentiles(sorted: &[f64]) -> (f64, f64, f64) {
    let at = |p| calculate_percentile(sorted, p).map_or(0.0, f64::round);
    (at(50.0), at(95.0), at(99.0))
}

fn aggregate_operation(snapshots: &[PerfSnapshot], name: &str) -> OperationMetrics {
    let mut count = 0u64;
    let mut total_ms = 0.0;
    let mut maxima = Vec::new();

    for stats in snapshots.iter().filter_map(|snapshot| snapshot.ops.get(name)) {
        if stats.count == 0 {
            continue;
        }
        count += stats.count;
        total_ms += stats.ms;
        if stats.max > 0.0 {
            maxima.push(stats.max);
        }
    }
    if count == 0 {
        return OperationMetrics::default();
    }

    #[expect(clippy::cast_precision_loss)]
    let avg_ms = total_ms / count as f64;
    let maxima = sorted_valid(maxima);
    let slow = snapshots
        .iter()
        .flat_map(|snapshot| &snapshot.slow)
        .filter(|slow| slow.op == name)
        .map(|slow| slow.ms);

    // Per-request maxima and slow-operation samples are the only durations recorded.
    let mut durations = sorted_valid(maxima.iter().copied().chain(slow));
    if durations.is_empty() && avg_ms > 0.0 {
        durations.push(avg_ms);
    }
    let (median_ms, p95_ms, p99_ms) = percentiles(&durations);

    OperationMetrics {
        count,
        total_ms: total_ms.round(),
        avg_ms: avg_ms.round(),
        min_ms: maxima.first().copied().unwrap_or(0.0).round(),
        max_ms: maxima.last().copied().unwrap_or(0.0).round(),
        median_ms,
        p95_ms,
        p99_ms,
    }
}

fn aggregate_cache(snapshots: &[PerfSnapshot]) -> CacheMetrics {
    let total_hits: u64 = snapshots.iter().map(|snapshot| snapshot.cache_hits).sum();
    let total_misses: u64 = snapshots.iter().map(|snapshot| snapshot.cache_misses).sum();
    let total_ops = total_hits + total_misses;

    #[expect(clippy::cast_precision_loss)]
    let hit_rate = if total_ops > 0 {
        total_hits as f64 / total_ops as f64
    } else {
        0.0
    };

    CacheMetrics {
        total_hits,
        total_misses,
        total_ops,
        hit_rate: round_to(hit_rate, 3),
    }
}

/// ## Summary
/// Aggregates the first `options.max_snapshots` snapshots: request time distribution,
/// cache hit rate, slow operation count, average complexity and per-operation timings.
#[must_use]
pub fn aggregate_metrics(
    snapshots: &[PerfSnapshot],
    options: &AggregationOptions,
) -> MetricsAggregationResult {
    let started = Instant::now();
    let snapshots = &snapshots[..snapshots.len().min(options.max_snapshots)];

    let names: BTreeSet<&str> = snapshots
        .iter()
        .flat_map(|snapshot| snapshot.ops.keys().map(String::as_str))
        .collect();
    let operations = names
        .into_iter()
        .map(|name| (name.to_owned(), aggregate_operation(snapshots, name)))
        .collect();

    let totals = sorted_valid(snapshots.iter().map(|snapshot| snapshot.total_ms));
    let (median_total_ms, p95_total_ms, p99_total_ms) = percentiles(&totals);

    let complexity = sorted_valid(snapshots.iter().filter_map(|snapshot| snapshot.complexity_score));

    let mut metrics = AggregatedMetrics::empty(options.window_minutes);
    metrics.snapshot_count = snapshots.len();
    metrics.operations = operations;
    metrics.cache = aggregate_cache(snapshots);
    metrics.slow_operation_count = snapshots
        .iter()
        .flat_map(|snapshot| &snapshot.slow)
        .filter(|slow| slow.ms >= options.slow_threshold_ms)
        .count();
    metrics.avg_total_ms = mean(&totals).map_or(0.0, f64::round);
    metrics.min_total_ms = totals.first().copied().unwrap_or(0.0).round();
    metrics.max_total_ms = totals.last().copied().unwrap_or(0.0).round();
    metrics.median_total_ms = median_total_ms;
    metrics.p95_total_ms = p95_total_ms;
    metrics.p99_total_ms = p99_total_ms;
    metrics.avg_complexity_score = mean(&complexity).map(|avg| round_to(avg, 2));

    MetricsAggregationResult {
        snapshots_processed: snapshots.len(),
        metrics,
        aggregation_duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / count_as_f64(values.len()))
}

/// ## Summary
/// Pulls recent snapshots from `provider`, aggregates them and logs the result.
///
/// Never fails: a provider error is logged and yields the empty aggregate.
pub fn run_metrics_aggregation_worker(
    provider: &dyn SnapshotProvider,
    options: &AggregationOptions,
) -> MetricsAggregationResult {
    let empty = || MetricsAggregationResult {
        metrics: AggregatedMetrics::empty(options.window_minutes),
        snapshots_processed: 0,
        aggregation_duration_ms: 0,
    };

    let snapshots = match provider.recent_snapshots(options.window_minutes, options.max_snapshots) {
        Ok(snapshots) => snapshots,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read performance snapshots");
            return empty();
        }
    };

    if snapshots.is_empty() {
        tracing::info!("No snapshots available for aggregation");
        return empty();
    }

    let result = aggregate_metrics(&snapshots, options);
    let metrics = &result.metrics;
    tracing::info!(
        snapshots = result.snapshots_processed,
        avg_total_ms = metrics.avg_total_ms,
        p95_total_ms = metrics.p95_total_ms,
        p99_total_ms = metrics.p99_total_ms,
        slow_operations = metrics.slow_operation_count,
        cache_hit_rate = metrics.cache.hit_rate,
        operations = metrics.operations.len(),
        "Aggregated request metrics"
    );
    result
}
