//! Bounded-concurrency execution of generation jobs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tracing_futures::Instrument;
use uuid::Uuid;

use cadence_db::db::store::GenerationStore;

use super::discovery::EventGenerationJob;
use crate::generation::materialize::{GenerateInstancesInput, generate_instances_for_recurring_event};

/// Outcome of one job. Failures are captured here, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job: EventGenerationJob,
    pub success: bool,
    pub instances_created: usize,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// Totals over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionMetrics {
    pub instances_created: usize,
    /// Successful jobs.
    pub events_processed: usize,
    /// Distinct organizations with at least one successful job.
    pub organizations_processed: usize,
    pub errors_encountered: usize,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub results: Vec<JobResult>,
    pub metrics: ExecutionMetrics,
}

impl BatchResult {
    pub fn successes(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|result| result.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|result| !result.success)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// ## Summary
/// Runs one job through the generation entry point and captures its outcome.
pub async fn execute_event_generation_job(
    store: &dyn GenerationStore,
    job: &EventGenerationJob,
) -> JobResult {
    let started = Instant::now();
    let input = GenerateInstancesInput {
        base_recurring_event_id: job.base_recurring_event_id,
        organization_id: job.organization_id,
        window_start: job.window_start,
        window_end: job.window_end,
        max_instances: job.max_instances,
    };

    match generate_instances_for_recurring_event(store, &input).await {
        Ok(instances_created) => JobResult {
            job: job.clone(),
            success: true,
            instances_created,
            execution_time_ms: elapsed_ms(started),
            error: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "Generation job failed");
            JobResult {
                job: job.clone(),
                success: false,
                instances_created: 0,
                execution_time_ms: elapsed_ms(started),
                error: Some(e.to_string()),
            }
        }
    }
}

/// ## Summary
/// Runs jobs in chunks of `max_concurrency`. Jobs of a chunk run concurrently and the next
/// chunk starts once every job of the previous one has settled. A failing or panicking job
/// never stops the others.
#[tracing::instrument(skip(store, jobs), fields(jobs = jobs.len()))]
pub async fn execute_batch_event_generation(
    store: Arc<dyn GenerationStore>,
    jobs: Vec<EventGenerationJob>,
    max_concurrency: usize,
) -> BatchResult {
    let started = Instant::now();
    let mut results = Vec::with_capacity(jobs.len());

    for chunk in jobs.chunks(max_concurrency.max(1)) {
        let handles = chunk.iter().cloned().map(|job| {
            let store = Arc::clone(&store);
            let span = tracing::info_span!(
                "generation_job",
                organization_id = %job.organization_id,
                base_recurring_event_id = %job.base_recurring_event_id,
            );
            tokio::spawn(
                async move { execute_event_generation_job(store.as_ref(), &job).await }
                    .instrument(span),
            )
        });

        for (job, settled) in chunk.iter().zip(join_all(handles).await) {
            results.push(settled.unwrap_or_else(|e| {
                tracing::error!(
                    organization_id = %job.organization_id,
                    base_recurring_event_id = %job.base_recurring_event_id,
                    error = %e,
                    "Generation job task aborted"
                );
                JobResult {
                    job: job.clone(),
                    success: false,
                    instances_created: 0,
                    execution_time_ms: 0,
                    error: Some(e.to_string()),
                }
            }));
        }
    }

    let metrics = summarize(&results, elapsed_ms(started));
    tracing::info!(
        instances_created = metrics.instances_created,
        events_processed = metrics.events_processed,
        organizations_processed = metrics.organizations_processed,
        errors_encountered = metrics.errors_encountered,
        total_time_ms = metrics.total_time_ms,
        "Batch generation finished"
    );

    BatchResult { results, metrics }
}

fn summarize(results: &[JobResult], total_time_ms: u64) -> ExecutionMetrics {
    let (successes, failures): (Vec<&JobResult>, Vec<&JobResult>) =
        results.iter().partition(|result| result.success);

    ExecutionMetrics {
        instances_created: successes.iter().map(|result| result.instances_created).sum(),
        events_processed: successes.len(),
        organizations_processed: successes
            .iter()
            .map(|result| result.job.organization_id)
            .collect::<HashSet<Uuid>>()
            .len(),
        errors_encountered: failures.len(),
        total_time_ms,
    }
}
