//! In-memory [`GenerationStore`] used by tests and local tooling.
//!
//! Enforces the same uniqueness constraints and orderings as the `PostgreSQL` schema.
//! Reads for selected templates or organizations can be made to fail so that
//! failure isolation can be exercised.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::store::{
    GenerationStore, InstanceFilter, InstanceStatistics, PurgeOutcome, WindowFilter, WindowOrder,
};
use crate::error::{DbError, DbResult};
use crate::model::exception::EventException;
use crate::model::instance::{GeneratedInstance, NewGeneratedInstance};
use crate::model::rule::{NewRecurrenceRule, RecurrenceRule};
use crate::model::template::RecurringTemplate;
use crate::model::window::{GenerationWindow, GenerationWindowChangeset, NewGenerationWindow};

#[derive(Debug, Default)]
struct Tables {
    templates: BTreeMap<Uuid, RecurringTemplate>,
    rules: Vec<RecurrenceRule>,
    instances: Vec<GeneratedInstance>,
    exceptions: Vec<EventException>,
    windows: BTreeMap<Uuid, GenerationWindow>,
    failing_templates: HashSet<Uuid>,
    failing_organizations: HashSet<Uuid>,
    panicking_window_scans: usize,
}

impl Tables {
    fn check_template(&self, template_id: Uuid) -> DbResult<()> {
        if self.failing_templates.contains(&template_id) {
            return Err(DbError::Unavailable(format!(
                "reads for template {template_id} are failing"
            )));
        }
        Ok(())
    }

    fn check_organization(&self, organization_id: Uuid) -> DbResult<()> {
        if self.failing_organizations.contains(&organization_id) {
            return Err(DbError::Unavailable(format!(
                "reads for organization {organization_id} are failing"
            )));
        }
        Ok(())
    }
}

/// Shared in-memory tables. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                self.tables.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    pub fn put_template(&self, template: RecurringTemplate) {
        self.write().templates.insert(template.id, template);
    }

    pub fn put_rule(&self, rule: RecurrenceRule) {
        self.write().rules.push(rule);
    }

    pub fn put_exception(&self, exception: EventException) {
        self.write().exceptions.push(exception);
    }

    pub fn put_window(&self, window: GenerationWindow) {
        self.write().windows.insert(window.organization_id, window);
    }

    pub fn put_instance(&self, instance: GeneratedInstance) {
        self.write().instances.push(instance);
    }

    /// Makes every read keyed by this template fail with [`DbError::Unavailable`].
    pub fn fail_template(&self, template_id: Uuid) {
        self.write().failing_templates.insert(template_id);
    }

    /// Makes every read scoped to this organization fail with [`DbError::Unavailable`].
    pub fn fail_organization(&self, organization_id: Uuid) {
        self.write().failing_organizations.insert(organization_id);
    }

    /// Makes the next `count` window scans panic, as a crashing driver would.
    pub fn panic_on_window_scans(&self, count: usize) {
        self.write().panicking_window_scans = count;
    }

    fn maybe_panic_on_window_scan(&self) {
        let mut tables = self.write();
        if tables.panicking_window_scans > 0 {
            tables.panicking_window_scans -= 1;
            drop(tables);
            panic!("window scan panicked");
        }
    }

    /// Snapshot of all instances ordered by original start time.
    #[must_use]
    pub fn instances(&self) -> Vec<GeneratedInstance> {
        let mut instances = self.read().instances.clone();
        instances.sort_by_key(|instance| {
            (
                instance.base_recurring_event_id,
                instance.original_instance_start_time,
            )
        });
        instances
    }

    #[must_use]
    pub fn window(&self, organization_id: Uuid) -> Option<GenerationWindow> {
        self.read().windows.get(&organization_id).cloned()
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn find_template(&self, id: Uuid) -> DbResult<Option<RecurringTemplate>> {
        let tables = self.read();
        tables.check_template(id)?;
        Ok(tables.templates.get(&id).cloned())
    }

    async fn find_templates(&self, ids: &[Uuid]) -> DbResult<Vec<RecurringTemplate>> {
        let tables = self.read();
        Ok(ids
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|id| tables.templates.get(id).cloned())
            .collect())
    }

    async fn list_recurring_templates(
        &self,
        organization_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<RecurringTemplate>> {
        let tables = self.read();
        tables.check_organization(organization_id)?;
        let limit = usize::try_from(limit).unwrap_or(0);

        Ok(tables
            .templates
            .values()
            .filter(|template| template.organization_id == organization_id)
            .filter(|template| template.is_recurring)
            .filter(|template| after.is_none_or(|after| template.id > after))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_rule_for_template(&self, template_id: Uuid) -> DbResult<Option<RecurrenceRule>> {
        let tables = self.read();
        tables.check_template(template_id)?;
        Ok(tables
            .rules
            .iter()
            .filter(|rule| rule.base_recurring_event_id == template_id)
            .max_by_key(|rule| rule.created_at)
            .cloned())
    }

    async fn find_rules_for_templates(
        &self,
        template_ids: &[Uuid],
    ) -> DbResult<Vec<RecurrenceRule>> {
        let tables = self.read();
        Ok(tables
            .rules
            .iter()
            .filter(|rule| template_ids.contains(&rule.base_recurring_event_id))
            .cloned()
            .collect())
    }

    async fn insert_rule(&self, rule: &NewRecurrenceRule) -> DbResult<RecurrenceRule> {
        let now = Utc::now();
        let stored = RecurrenceRule {
            id: Uuid::now_v7(),
            base_recurring_event_id: rule.base_recurring_event_id,
            original_series_id: rule.original_series_id,
            frequency: rule.frequency,
            interval: rule.interval,
            recurrence_start_date: rule.recurrence_start_date,
            recurrence_end_date: rule.recurrence_end_date,
            count: rule.count,
            by_day: rule.by_day.clone(),
            by_month: rule.by_month.clone(),
            by_month_day: rule.by_month_day.clone(),
            created_at: now,
            updated_at: now,
        };
        self.write().rules.push(stored.clone());
        Ok(stored)
    }

    async fn exceptions_for_template(&self, template_id: Uuid) -> DbResult<Vec<EventException>> {
        let tables = self.read();
        tables.check_template(template_id)?;
        let mut exceptions: Vec<_> = tables
            .exceptions
            .iter()
            .filter(|exception| exception.base_recurring_event_id == template_id)
            .cloned()
            .collect();
        exceptions.sort_by_key(|exception| exception.original_instance_start_time);
        Ok(exceptions)
    }

    async fn exceptions_for_instances(
        &self,
        instance_ids: &[Uuid],
    ) -> DbResult<Vec<EventException>> {
        let tables = self.read();
        Ok(tables
            .exceptions
            .iter()
            .filter(|exception| instance_ids.contains(&exception.recurring_event_instance_id))
            .cloned()
            .collect())
    }

    async fn existing_start_times(
        &self,
        base_recurring_event_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<DateTime<Utc>>> {
        let tables = self.read();
        tables.check_template(base_recurring_event_id)?;
        let mut times: Vec<_> = tables
            .instances
            .iter()
            .filter(|instance| instance.base_recurring_event_id == base_recurring_event_id)
            .map(|instance| instance.original_instance_start_time)
            .filter(|start| *start >= from && *start <= to)
            .collect();
        times.sort_unstable();
        Ok(times)
    }

    async fn insert_instances(&self, instances: &[NewGeneratedInstance]) -> DbResult<usize> {
        let mut tables = self.write();
        let mut keys: HashSet<(Uuid, DateTime<Utc>)> = tables
            .instances
            .iter()
            .map(|instance| {
                (
                    instance.base_recurring_event_id,
                    instance.original_instance_start_time,
                )
            })
            .collect();

        let mut inserted = 0;
        for new in instances {
            if keys.insert((new.base_recurring_event_id, new.original_instance_start_time)) {
                tables.instances.push(GeneratedInstance::from(new.clone()));
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    async fn find_instances(&self, filter: &InstanceFilter) -> DbResult<Vec<GeneratedInstance>> {
        let tables = self.read();
        if let Some(organization_id) = filter.organization_id {
            tables.check_organization(organization_id)?;
        }

        let mut instances: Vec<_> = tables
            .instances
            .iter()
            .filter(|instance| filter.matches(instance))
            .cloned()
            .collect();
        instances.sort_by_key(|instance| (instance.actual_start_time, instance.id));
        if let Some(limit) = filter.limit {
            instances.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(instances)
    }

    async fn count_instances(&self, filter: &InstanceFilter) -> DbResult<i64> {
        let tables = self.read();
        if let Some(organization_id) = filter.organization_id {
            tables.check_organization(organization_id)?;
        }

        let count = tables
            .instances
            .iter()
            .filter(|instance| filter.matches(instance))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn delete_instances(&self, filter: &InstanceFilter) -> DbResult<usize> {
        let mut tables = self.write();
        if let Some(organization_id) = filter.organization_id {
            tables.check_organization(organization_id)?;
        }

        let before = tables.instances.len();
        tables.instances.retain(|instance| !filter.matches(instance));
        Ok(before - tables.instances.len())
    }

    async fn purge_instances(&self, filter: &InstanceFilter) -> DbResult<PurgeOutcome> {
        let mut tables = self.write();
        let organizations: BTreeSet<Uuid> = tables
            .instances
            .iter()
            .filter(|instance| filter.matches(instance))
            .map(|instance| instance.organization_id)
            .collect();

        let before = tables.instances.len();
        tables.instances.retain(|instance| !filter.matches(instance));

        Ok(PurgeOutcome {
            instances_deleted: before - tables.instances.len(),
            organizations: organizations.into_iter().collect(),
        })
    }

    async fn instance_statistics(&self) -> DbResult<InstanceStatistics> {
        let tables = self.read();
        let organizations: HashSet<Uuid> = tables
            .instances
            .iter()
            .map(|instance| instance.organization_id)
            .collect();

        Ok(InstanceStatistics {
            total_instances: i64::try_from(tables.instances.len()).unwrap_or(i64::MAX),
            total_organizations: i64::try_from(organizations.len()).unwrap_or(i64::MAX),
            oldest_instance_end: tables
                .instances
                .iter()
                .map(|instance| instance.actual_end_time)
                .min(),
            newest_instance_end: tables
                .instances
                .iter()
                .map(|instance| instance.actual_end_time)
                .max(),
        })
    }

    async fn insert_window_if_absent(
        &self,
        window: &NewGenerationWindow,
    ) -> DbResult<Option<GenerationWindow>> {
        let mut tables = self.write();
        if tables.windows.contains_key(&window.organization_id) {
            return Ok(None);
        }

        let now = Utc::now();
        let row = GenerationWindow {
            id: Uuid::now_v7(),
            organization_id: window.organization_id,
            hot_window_months_ahead: window.hot_window_months_ahead,
            history_retention_months: window.history_retention_months,
            current_window_end_date: window.current_window_end_date,
            retention_start_date: window.retention_start_date,
            processing_priority: window.processing_priority,
            max_instances_per_run: window.max_instances_per_run,
            is_enabled: window.is_enabled,
            last_processed_at: None,
            last_processed_instance_count: 0,
            created_by_id: window.created_by_id,
            created_at: now,
            updated_at: now,
        };
        tables.windows.insert(row.organization_id, row.clone());
        Ok(Some(row))
    }

    async fn find_window(&self, organization_id: Uuid) -> DbResult<Option<GenerationWindow>> {
        let tables = self.read();
        tables.check_organization(organization_id)?;
        Ok(tables.windows.get(&organization_id).cloned())
    }

    async fn find_windows(&self, filter: &WindowFilter) -> DbResult<Vec<GenerationWindow>> {
        self.maybe_panic_on_window_scan();
        let tables = self.read();
        let mut windows: Vec<_> = tables
            .windows
            .values()
            .filter(|window| filter.matches(window))
            .cloned()
            .collect();

        if filter.order == WindowOrder::PriorityDesc {
            windows.sort_by(|a, b| {
                b.processing_priority
                    .cmp(&a.processing_priority)
                    .then(a.current_window_end_date.cmp(&b.current_window_end_date))
            });
        }
        if let Some(limit) = filter.limit {
            windows.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(windows)
    }

    async fn update_window(
        &self,
        organization_id: Uuid,
        changes: &GenerationWindowChangeset,
    ) -> DbResult<usize> {
        let mut tables = self.write();
        tables.check_organization(organization_id)?;
        Ok(tables
            .windows
            .get_mut(&organization_id)
            .map_or(0, |window| {
                changes.apply_to(window);
                1
            }))
    }
}
