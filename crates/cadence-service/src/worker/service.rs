//! Cron-driven supervisor of the materialization, cleanup and metrics workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing_futures::Instrument;
use uuid::Uuid;

use cadence_core::config::SchedulerConfig;
use cadence_db::db::store::GenerationStore;

use super::cleanup::{
    CleanupStats, EmergencyCleanupResult, OrganizationCleanupResult, cleanup_old_instances,
    cleanup_specific_organization, emergency_cleanup_before,
};
use super::cron::{next_fire_time, parse_cron_schedule};
use super::metrics::{AggregationOptions, SnapshotProvider, run_metrics_aggregation_worker};
use super::pipeline::{
    WorkerConfig, WorkerConfigUpdate, WorkerResult, run_materialization_worker,
    run_single_organization_worker,
};
use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub is_running: bool,
    pub materialization_schedule: String,
    pub cleanup_schedule: String,
    pub metrics_schedule: Option<String>,
    pub metrics_enabled: bool,
    pub materialization_config: WorkerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub details: ServiceStatus,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Materialization,
    Cleanup,
    Metrics,
}

impl Trigger {
    const fn name(self) -> &'static str {
        match self {
            Self::Materialization => "materialization",
            Self::Cleanup => "cleanup",
            Self::Metrics => "metrics",
        }
    }
}

/// State shared between the service handle and its scheduled tasks.
#[derive(Clone)]
struct Workers {
    store: Arc<dyn GenerationStore>,
    config: Arc<RwLock<WorkerConfig>>,
    snapshot_provider: Option<Arc<dyn SnapshotProvider>>,
    metrics_window_minutes: u32,
}

impl Workers {
    fn config(&self) -> WorkerConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one scheduled job, logging its outcome instead of returning it.
    async fn run(&self, trigger: Trigger) {
        let started = Instant::now();
        tracing::info!(job = trigger.name(), "Scheduled job starting");

        match trigger {
            Trigger::Materialization => {
                let result = run_materialization_worker(Arc::clone(&self.store), &self.config()).await;
                tracing::info!(
                    organizations_processed = result.organizations_processed,
                    instances_created = result.instances_created,
                    windows_updated = result.windows_updated,
                    errors_encountered = result.errors_encountered,
                    duration_ms = started.elapsed().as_millis(),
                    "Scheduled materialization finished"
                );
            }
            Trigger::Cleanup => match cleanup_old_instances(self.store.as_ref(), Utc::now()).await {
                Ok(stats) => tracing::info!(
                    organizations_processed = stats.organizations_processed,
                    instances_deleted = stats.instances_deleted,
                    errors_encountered = stats.errors_encountered,
                    duration_ms = started.elapsed().as_millis(),
                    "Scheduled cleanup finished"
                ),
                Err(e) => tracing::error!(
                    error = %e,
                    duration_ms = started.elapsed().as_millis(),
                    "Scheduled cleanup failed"
                ),
            },
            Trigger::Metrics => {
                let Some(provider) = &self.snapshot_provider else {
                    tracing::error!("Metrics aggregation scheduled without a snapshot provider");
                    return;
                };
                let options = AggregationOptions {
                    window_minutes: self.metrics_window_minutes,
                    ..AggregationOptions::default()
                };
                let result = run_metrics_aggregation_worker(provider.as_ref(), &options);
                tracing::info!(
                    snapshots_processed = result.snapshots_processed,
                    duration_ms = started.elapsed().as_millis(),
                    "Scheduled metrics aggregation finished"
                );
            }
        }
    }

    /// Sleeps until each fire time of `schedule` and runs `trigger`. Runs of the same
    /// trigger never overlap.
    fn arm(&self, trigger: Trigger, schedule: Schedule) -> JoinHandle<()> {
        let workers = self.clone();
        let span = tracing::info_span!("scheduled_trigger", job = trigger.name());

        tokio::spawn(
            async move {
                while let Some(next) = next_fire_time(&schedule, Utc::now()) {
                    let delay = (next - Utc::now()).to_std().unwrap_or_default();
                    tokio::time::sleep(delay).await;

                    // A panicking run must not end the schedule.
                    let run = workers.clone();
                    let outcome =
                        tokio::spawn(async move { run.run(trigger).await }.in_current_span()).await;
                    if let Err(e) = outcome {
                        tracing::error!(error = %e, "Scheduled run aborted");
                    }
                }
                tracing::warn!("Schedule has no further fire times");
            }
            .instrument(span),
        )
    }
}

/// Owns the periodic triggers and exposes manual runs of every worker.
///
/// Lifecycle: Stopped → `start` → Running → `stop` → Stopped.
pub struct BackgroundWorkerService {
    workers: Workers,
    scheduler: SchedulerConfig,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundWorkerService {
    #[must_use]
    pub fn new(
        store: Arc<dyn GenerationStore>,
        scheduler: SchedulerConfig,
        config: WorkerConfig,
        snapshot_provider: Option<Arc<dyn SnapshotProvider>>,
    ) -> Self {
        Self {
            workers: Workers {
                store,
                config: Arc::new(RwLock::new(config)),
                snapshot_provider,
                metrics_window_minutes: scheduler.metrics_window_minutes,
            },
            scheduler,
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn GenerationStore {
        self.workers.store.as_ref()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn schedules(&self) -> ServiceResult<Vec<(Trigger, Schedule)>> {
        let mut schedules = vec![
            (
                Trigger::Materialization,
                parse_cron_schedule(&self.scheduler.materialization_schedule)?,
            ),
            (
                Trigger::Cleanup,
                parse_cron_schedule(&self.scheduler.cleanup_schedule)?,
            ),
        ];

        if self.scheduler.metrics_enabled {
            if self.workers.snapshot_provider.is_none() {
                return Err(ServiceError::MissingDependency("performance snapshot provider"));
            }
            schedules.push((
                Trigger::Metrics,
                parse_cron_schedule(&self.scheduler.metrics_schedule)?,
            ));
        }

        Ok(schedules)
    }

    /// ## Summary
    /// Validates every schedule, arms the periodic triggers and kicks off an immediate
    /// materialization run. Starting a running service is a no-op.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// ## Errors
    /// Returns an error for an invalid cron expression, or when metrics aggregation is
    /// enabled without a snapshot provider. The service stays stopped in both cases.
    pub fn start(&self) -> ServiceResult<()> {
        if self.is_running() {
            tracing::warn!("Background workers already running");
            return Ok(());
        }

        let schedules = self.schedules()?;

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for (trigger, schedule) in schedules {
            tasks.push(self.workers.arm(trigger, schedule));
        }

        let workers = self.workers.clone();
        tasks.push(tokio::spawn(
            async move { workers.run(Trigger::Materialization).await }
                .instrument(tracing::info_span!("initial_materialization")),
        ));

        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            materialization_schedule = %self.scheduler.materialization_schedule,
            cleanup_schedule = %self.scheduler.cleanup_schedule,
            metrics_enabled = self.scheduler.metrics_enabled,
            "Background workers started"
        );
        Ok(())
    }

    /// ## Summary
    /// Cancels every scheduled task. Idempotent.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }

        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Background workers stopped");
        } else {
            tracing::debug!("Background workers already stopped");
        }
    }

    fn ensure_running(&self) -> ServiceResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(ServiceError::NotRunning)
        }
    }

    /// ## Errors
    /// Returns [`ServiceError::NotRunning`] while the service is stopped.
    pub async fn trigger_materialization(&self) -> ServiceResult<WorkerResult> {
        self.ensure_running()?;
        tracing::info!("Manual materialization triggered");
        Ok(run_materialization_worker(Arc::clone(&self.workers.store), &self.workers.config()).await)
    }

    /// ## Errors
    /// Returns [`ServiceError::NotRunning`] while the service is stopped, or
    /// [`ServiceError::NotFound`] if the organization has no window.
    pub async fn trigger_materialization_for_organization(
        &self,
        organization_id: Uuid,
    ) -> ServiceResult<WorkerResult> {
        self.ensure_running()?;
        tracing::info!(%organization_id, "Manual materialization triggered for organization");
        run_single_organization_worker(
            Arc::clone(&self.workers.store),
            organization_id,
            &self.workers.config(),
        )
        .await
    }

    /// ## Errors
    /// Returns [`ServiceError::NotRunning`] while the service is stopped, or an error if the
    /// windows cannot be listed.
    pub async fn trigger_cleanup(&self) -> ServiceResult<CleanupStats> {
        self.ensure_running()?;
        tracing::info!("Manual cleanup triggered");
        cleanup_old_instances(self.store(), Utc::now()).await
    }

    /// ## Errors
    /// Returns [`ServiceError::NotRunning`] while the service is stopped, or
    /// [`ServiceError::NotFound`] if the organization has no window.
    pub async fn trigger_cleanup_for_organization(
        &self,
        organization_id: Uuid,
    ) -> ServiceResult<OrganizationCleanupResult> {
        self.ensure_running()?;
        tracing::info!(%organization_id, "Manual cleanup triggered for organization");
        cleanup_specific_organization(self.store(), organization_id, Utc::now()).await
    }

    /// ## Errors
    /// Returns [`ServiceError::NotRunning`] while the service is stopped, or an error if the
    /// purge fails.
    pub async fn trigger_emergency_cleanup(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ServiceResult<EmergencyCleanupResult> {
        self.ensure_running()?;
        emergency_cleanup_before(self.store(), cutoff).await
    }

    #[must_use]
    pub fn get_status(&self) -> ServiceStatus {
        ServiceStatus {
            is_running: self.is_running(),
            materialization_schedule: self.scheduler.materialization_schedule.clone(),
            cleanup_schedule: self.scheduler.cleanup_schedule.clone(),
            metrics_schedule: self
                .scheduler
                .metrics_enabled
                .then(|| self.scheduler.metrics_schedule.clone()),
            metrics_enabled: self.scheduler.metrics_enabled,
            materialization_config: self.workers.config(),
        }
    }

    #[must_use]
    pub fn health_check(&self) -> HealthReport {
        let details = self.get_status();
        if details.is_running {
            HealthReport {
                status: HealthStatus::Healthy,
                reason: None,
                details,
            }
        } else {
            HealthReport {
                status: HealthStatus::Unhealthy,
                reason: Some("Background workers not running".to_owned()),
                details,
            }
        }
    }

    /// ## Summary
    /// Merges `update` into the materialization settings used by subsequent runs.
    pub fn update_materialization_config(&self, update: &WorkerConfigUpdate) -> WorkerConfig {
        let mut config = self
            .workers
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *config = config.merged(update);
        tracing::info!(config = ?*config, "Materialization config updated");
        config.clone()
    }
}

impl Drop for BackgroundWorkerService {
    fn drop(&mut self) {
        self.stop();
    }
}
