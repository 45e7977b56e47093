//! One materialization pass: discover, build jobs, execute, then advance windows.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_core::config::MaterializationConfig;
use cadence_db::db::store::GenerationStore;
use cadence_db::model::window::GenerationWindowChangeset;

use super::discovery::{
    JobDiscoveryConfig, OrganizationWorkload, create_event_generation_jobs,
    discover_materialization_workloads, discover_workload_for_organization, hot_window_end,
};
use super::engine::{BatchResult, execute_batch_event_generation};
use crate::error::ServiceResult;

/// Runtime settings of the materialization worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub max_concurrent_jobs: usize,
    pub max_organizations: usize,
    /// Advance windows and record processing markers after each run.
    pub enable_post_processing: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        MaterializationConfig::default().into()
    }
}

impl From<MaterializationConfig> for WorkerConfig {
    fn from(config: MaterializationConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs,
            max_organizations: config.max_organizations,
            enable_post_processing: config.enable_post_processing,
        }
    }
}

/// Partial [`WorkerConfig`]; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfigUpdate {
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
    #[serde(default)]
    pub max_organizations: Option<usize>,
    #[serde(default)]
    pub enable_post_processing: Option<bool>,
}

impl WorkerConfig {
    #[must_use]
    pub fn merged(&self, update: &WorkerConfigUpdate) -> Self {
        Self {
            max_concurrent_jobs: update.max_concurrent_jobs.unwrap_or(self.max_concurrent_jobs),
            max_organizations: update.max_organizations.unwrap_or(self.max_organizations),
            enable_post_processing: update
                .enable_post_processing
                .unwrap_or(self.enable_post_processing),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerResult {
    pub organizations_processed: usize,
    pub instances_created: usize,
    pub windows_updated: usize,
    pub errors_encountered: usize,
    pub processing_time_ms: u64,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// ## Summary
/// Runs a full materialization pass over every due organization.
///
/// Never fails: a discovery failure is logged and reported as a single error.
///
/// ## Side Effects
/// Inserts generated instances and, with post-processing enabled, updates windows.
#[tracing::instrument(skip(store, config), fields(
    max_concurrent_jobs = config.max_concurrent_jobs,
    max_organizations = config.max_organizations,
))]
pub async fn run_materialization_worker(
    store: Arc<dyn GenerationStore>,
    config: &WorkerConfig,
) -> WorkerResult {
    let started = Instant::now();
    let now = Utc::now();
    let discovery = JobDiscoveryConfig {
        max_organizations: config.max_organizations,
        ..JobDiscoveryConfig::default()
    };

    let workloads = match discover_materialization_workloads(store.as_ref(), &discovery, now).await {
        Ok(workloads) => workloads,
        Err(e) => {
            tracing::error!(error = %e, "Materialization discovery failed");
            return WorkerResult {
                errors_encountered: 1,
                processing_time_ms: elapsed_ms(started),
                ..WorkerResult::default()
            };
        }
    };

    let mut result = process_workloads(store, &workloads, config, now).await;
    result.processing_time_ms = elapsed_ms(started);
    result
}

/// ## Summary
/// Runs a materialization pass for one organization, whether or not it is due.
///
/// ## Errors
/// Returns [`crate::error::ServiceError::NotFound`] if the organization has no window, or an
/// error if its templates cannot be read.
#[tracing::instrument(skip(store, config))]
pub async fn run_single_organization_worker(
    store: Arc<dyn GenerationStore>,
    organization_id: Uuid,
    config: &WorkerConfig,
) -> ServiceResult<WorkerResult> {
    let started = Instant::now();
    let now = Utc::now();

    let workloads: Vec<_> = discover_workload_for_organization(store.as_ref(), organization_id, now)
        .await?
        .into_iter()
        .collect();

    let mut result = process_workloads(store, &workloads, config, now).await;
    result.processing_time_ms = elapsed_ms(started);
    Ok(result)
}

async fn process_workloads(
    store: Arc<dyn GenerationStore>,
    workloads: &[OrganizationWorkload],
    config: &WorkerConfig,
    now: DateTime<Utc>,
) -> WorkerResult {
    if workloads.is_empty() {
        return WorkerResult::default();
    }

    let jobs = create_event_generation_jobs(workloads, now);
    tracing::info!(jobs = jobs.len(), organizations = workloads.len(), "Executing materialization jobs");

    let batch =
        execute_batch_event_generation(Arc::clone(&store), jobs, config.max_concurrent_jobs).await;

    let (windows_updated, post_errors) = if config.enable_post_processing {
        post_process(store.as_ref(), &batch, now).await
    } else {
        (0, 0)
    };

    WorkerResult {
        organizations_processed: batch.metrics.organizations_processed,
        instances_created: batch.metrics.instances_created,
        windows_updated,
        errors_encountered: batch.metrics.errors_encountered + post_errors,
        processing_time_ms: 0,
    }
}

/// Advances the window of every organization with a successful job to its hot window end.
/// Returns `(windows_updated, errors)`.
///
/// Finite series run past the hot window end in one go, but the window only tracks the hot
/// horizon so that never-ending series are generated without gaps on the next run.
async fn post_process(
    store: &dyn GenerationStore,
    batch: &BatchResult,
    now: DateTime<Utc>,
) -> (usize, usize) {
    let mut progress: BTreeMap<Uuid, usize> = BTreeMap::new();
    for result in batch.successes() {
        *progress.entry(result.job.organization_id).or_default() += result.instances_created;
    }

    let mut updated = 0;
    let mut errors = 0;
    for (organization_id, instances_created) in progress {
        match advance_window(store, organization_id, instances_created, now).await {
            Ok(true) => updated += 1,
            Ok(false) => {
                tracing::warn!(%organization_id, "Window disappeared before post-processing");
            }
            Err(e) => {
                tracing::error!(%organization_id, error = %e, "Failed to update generation window");
                errors += 1;
            }
        }
    }

    (updated, errors)
}

async fn advance_window(
    store: &dyn GenerationStore,
    organization_id: Uuid,
    instances_created: usize,
    now: DateTime<Utc>,
) -> ServiceResult<bool> {
    let Some(window) = store.find_window(organization_id).await? else {
        return Ok(false);
    };

    let mut changes = GenerationWindowChangeset::new(now);
    changes.current_window_end_date =
        Some(window.current_window_end_date.max(hot_window_end(&window, now)));
    changes.last_processed_at = Some(now);
    changes.last_processed_instance_count =
        Some(i32::try_from(instances_created).unwrap_or(i32::MAX));

    Ok(store.update_window(organization_id, &changes).await? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::fixtures::{self, utc};
    use cadence_db::db::enums::Frequency;
    use cadence_db::db::memory::MemoryStore;
    use chrono::Duration;

    fn seed_organization(store: &MemoryStore, count: i32) -> Uuid {
        let organization_id = Uuid::now_v7();
        let now = Utc::now();
        store.put_window(fixtures::window(organization_id, now));

        let template = fixtures::template(organization_id, "Weekly", now, Duration::hours(1));
        let mut rule = fixtures::rule(&template, Frequency::Weekly);
        rule.count = Some(count);
        store.put_rule(rule);
        store.put_template(template);
        organization_id
    }

    #[test]
    fn config_update_merges() {
        let config = WorkerConfig::default();
        let merged = config.merged(&WorkerConfigUpdate {
            max_concurrent_jobs: Some(3),
            ..WorkerConfigUpdate::default()
        });
        assert_eq!(merged.max_concurrent_jobs, 3);
        assert_eq!(merged.max_organizations, 50);
        assert!(merged.enable_post_processing);
    }

    #[test_log::test(tokio::test)]
    async fn full_pass_materializes_and_advances_windows() {
        let store = MemoryStore::new();
        let first = seed_organization(&store, 4);
        let second = seed_organization(&store, 6);
        let shared: Arc<dyn GenerationStore> = Arc::new(store.clone());

        let result = run_materialization_worker(Arc::clone(&shared), &WorkerConfig::default()).await;

        assert_eq!(result.organizations_processed, 2);
        assert_eq!(result.instances_created, 10);
        assert_eq!(result.windows_updated, 2);
        assert_eq!(result.errors_encountered, 0);

        for (organization_id, created) in [(first, 4), (second, 6)] {
            let window = store.window(organization_id).expect("window");
            assert!(window.last_processed_at.is_some());
            assert_eq!(window.last_processed_instance_count, created);
            assert!(window.current_window_end_date > Utc::now() + Duration::days(300));
        }

        // Just processed: nothing is due.
        let again = run_materialization_worker(shared, &WorkerConfig::default()).await;
        assert_eq!(again, WorkerResult { processing_time_ms: again.processing_time_ms, ..WorkerResult::default() });
    }

    #[test_log::test(tokio::test)]
    async fn post_processing_can_be_disabled() {
        let store = MemoryStore::new();
        let organization_id = seed_organization(&store, 3);
        let config = WorkerConfig {
            enable_post_processing: false,
            ..WorkerConfig::default()
        };

        let result = run_materialization_worker(Arc::new(store.clone()), &config).await;

        assert_eq!(result.instances_created, 3);
        assert_eq!(result.windows_updated, 0);
        assert!(store.window(organization_id).expect("window").last_processed_at.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn single_organization_ignores_reprocess_interval() {
        let store = MemoryStore::new();
        let organization_id = seed_organization(&store, 2);
        let other = seed_organization(&store, 5);
        let mut window = store.window(organization_id).expect("window");
        window.last_processed_at = Some(Utc::now());
        store.put_window(window);

        let result = run_single_organization_worker(
            Arc::new(store.clone()),
            organization_id,
            &WorkerConfig::default(),
        )
        .await
        .expect("run");

        assert_eq!(result.instances_created, 2);
        assert_eq!(result.organizations_processed, 1);
        assert!(store.instances().iter().all(|i| i.organization_id != other));
    }

    #[test_log::test(tokio::test)]
    async fn single_organization_without_window_is_not_found() {
        let result = run_single_organization_worker(
            Arc::new(MemoryStore::new()),
            Uuid::now_v7(),
            &WorkerConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[test_log::test(tokio::test)]
    async fn window_end_tracks_hot_horizon_and_never_moves_backwards() {
        let store = MemoryStore::new();
        let organization_id = seed_organization(&store, 2);
        let far = utc(2100, 1, 1, 0, 0);
        let now = Utc::now();

        let advanced = advance_window(&store, organization_id, 0, now).await.expect("update");
        assert!(advanced);
        let mut window = store.window(organization_id).expect("window");
        assert_eq!(window.current_window_end_date, hot_window_end(&window, now));

        window.current_window_end_date = far;
        store.put_window(window);
        advance_window(&store, organization_id, 1, now).await.expect("update");
        assert_eq!(store.window(organization_id).expect("window").current_window_end_date, far);
    }

    #[test_log::test(tokio::test)]
    async fn long_finite_series_leaves_no_gap_in_never_ending_series() {
        let store = MemoryStore::new();
        let organization_id = Uuid::now_v7();
        let now = Utc::now();
        store.put_window(fixtures::window(organization_id, now));

        let start = now + Duration::days(1);
        let weekly = fixtures::template(organization_id, "Weekly sync", start, Duration::hours(1));
        store.put_rule(fixtures::rule(&weekly, Frequency::Weekly));
        let monthly = fixtures::template(organization_id, "Board", start, Duration::hours(2));
        let mut board_rule = fixtures::rule(&monthly, Frequency::Monthly);
        board_rule.count = Some(36);
        store.put_rule(board_rule);
        let weekly_id = weekly.id;
        store.put_template(weekly);
        store.put_template(monthly);

        let shared: Arc<dyn GenerationStore> = Arc::new(store.clone());
        run_materialization_worker(Arc::clone(&shared), &WorkerConfig::default()).await;

        let window_end = store.window(organization_id).expect("window").current_window_end_date;
        assert!(window_end < now + Duration::days(400));

        run_single_organization_worker(shared, organization_id, &WorkerConfig::default())
            .await
            .expect("second run");

        let weekly_starts: Vec<_> = store
            .instances()
            .into_iter()
            .filter(|instance| instance.base_recurring_event_id == weekly_id)
            .map(|instance| instance.original_instance_start_time)
            .collect();
        assert!(weekly_starts.len() > 50);
        assert!(weekly_starts.windows(2).all(|pair| pair[1] - pair[0] == Duration::weeks(1)));
        let window_end = store.window(organization_id).expect("window").current_window_end_date;
        let last = *weekly_starts.last().expect("weekly instances");
        assert!(window_end - last <= Duration::weeks(1));
        let board_count = store
            .instances()
            .iter()
            .filter(|instance| instance.base_recurring_event_id != weekly_id)
            .count();
        assert_eq!(board_count, 36);
    }
}
