//! The datastore interface consumed by the generation engine.
//!
//! [`GenerationStore`] is implemented for the `PostgreSQL` pool here and for the in-memory
//! store in [`crate::db::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::scoped_futures::ScopedFutureExt;
use serde::Serialize;
use uuid::Uuid;

use crate::db::DbProvider;
use crate::db::connection::DbPool;
use crate::db::query;
use crate::db::transaction::with_transaction;
use crate::error::DbResult;
use crate::model::exception::EventException;
use crate::model::instance::{GeneratedInstance, NewGeneratedInstance};
use crate::model::rule::{NewRecurrenceRule, RecurrenceRule};
use crate::model::template::RecurringTemplate;
use crate::model::window::{GenerationWindow, GenerationWindowChangeset, NewGenerationWindow};

/// Constraints on generated instances. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub organization_id: Option<Uuid>,
    pub base_recurring_event_id: Option<Uuid>,
    /// Inclusive lower bound on `actual_start_time`.
    pub actual_start_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `actual_start_time`.
    pub actual_start_before: Option<DateTime<Utc>>,
    /// Inclusive lower bound on `actual_end_time`.
    pub actual_end_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `actual_end_time`.
    pub actual_end_before: Option<DateTime<Utc>>,
    pub exclude_cancelled: bool,
    pub limit: Option<i64>,
}

impl InstanceFilter {
    #[must_use]
    pub fn for_organization(organization_id: Uuid) -> Self {
        Self {
            organization_id: Some(organization_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn ended_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.actual_end_before = Some(cutoff);
        self
    }

    #[must_use]
    pub const fn ended_at_or_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.actual_end_from = Some(cutoff);
        self
    }

    /// ## Summary
    /// Evaluates the filter against a row. `limit` is not considered.
    #[must_use]
    pub fn matches(&self, instance: &GeneratedInstance) -> bool {
        self.organization_id
            .is_none_or(|id| instance.organization_id == id)
            && self
                .base_recurring_event_id
                .is_none_or(|id| instance.base_recurring_event_id == id)
            && self
                .actual_start_from
                .is_none_or(|from| instance.actual_start_time >= from)
            && self
                .actual_start_before
                .is_none_or(|before| instance.actual_start_time < before)
            && self
                .actual_end_from
                .is_none_or(|from| instance.actual_end_time >= from)
            && self
                .actual_end_before
                .is_none_or(|before| instance.actual_end_time < before)
            && !(self.exclude_cancelled && instance.is_cancelled)
    }
}

/// Ordering applied to window listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowOrder {
    #[default]
    OrganizationId,
    /// Highest processing priority first, then the soonest-expiring window.
    PriorityDesc,
}

/// Constraints on generation windows. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowFilter {
    pub enabled_only: bool,
    /// Exclusive upper bound on `current_window_end_date`.
    pub window_end_before: Option<DateTime<Utc>>,
    /// Matches windows last processed before this instant, or never processed.
    pub processed_before: Option<DateTime<Utc>>,
    pub order: WindowOrder,
    pub limit: Option<i64>,
}

impl WindowFilter {
    /// ## Summary
    /// Evaluates the filter against a row. Ordering and `limit` are not considered.
    #[must_use]
    pub fn matches(&self, window: &GenerationWindow) -> bool {
        (!self.enabled_only || window.is_enabled)
            && self
                .window_end_before
                .is_none_or(|end| window.current_window_end_date < end)
            && self.processed_before.is_none_or(|cutoff| {
                window
                    .last_processed_at
                    .is_none_or(|processed_at| processed_at < cutoff)
            })
    }
}

/// Table-wide instance totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceStatistics {
    pub total_instances: i64,
    pub total_organizations: i64,
    pub oldest_instance_end: Option<DateTime<Utc>>,
    pub newest_instance_end: Option<DateTime<Utc>>,
}

/// Outcome of an atomic delete that also reports which organizations lost rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub instances_deleted: usize,
    pub organizations: Vec<Uuid>,
}

/// ## Summary
/// Datastore operations required by generation, cleanup and the read path.
///
/// Every mutating operation returns the number of affected rows.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn find_template(&self, id: Uuid) -> DbResult<Option<RecurringTemplate>>;

    async fn find_templates(&self, ids: &[Uuid]) -> DbResult<Vec<RecurringTemplate>>;

    /// One page of an organization's recurring templates ordered by id, after `after`.
    async fn list_recurring_templates(
        &self,
        organization_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<RecurringTemplate>>;

    async fn find_rule_for_template(&self, template_id: Uuid) -> DbResult<Option<RecurrenceRule>>;

    async fn find_rules_for_templates(&self, template_ids: &[Uuid])
    -> DbResult<Vec<RecurrenceRule>>;

    /// Attaches a rule to a template. The newest rule of a template is the one in effect.
    async fn insert_rule(&self, rule: &NewRecurrenceRule) -> DbResult<RecurrenceRule>;

    async fn exceptions_for_template(&self, template_id: Uuid) -> DbResult<Vec<EventException>>;

    async fn exceptions_for_instances(&self, instance_ids: &[Uuid])
    -> DbResult<Vec<EventException>>;

    /// Original start times already materialized for a template within `[from, to]`.
    async fn existing_start_times(
        &self,
        base_recurring_event_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<DateTime<Utc>>>;

    /// Inserts instances, silently skipping rows that would duplicate
    /// `(base_recurring_event_id, original_instance_start_time)`.
    async fn insert_instances(&self, instances: &[NewGeneratedInstance]) -> DbResult<usize>;

    async fn find_instances(&self, filter: &InstanceFilter) -> DbResult<Vec<GeneratedInstance>>;

    async fn count_instances(&self, filter: &InstanceFilter) -> DbResult<i64>;

    async fn delete_instances(&self, filter: &InstanceFilter) -> DbResult<usize>;

    /// Deletes matching instances and reports the affected organizations atomically.
    async fn purge_instances(&self, filter: &InstanceFilter) -> DbResult<PurgeOutcome>;

    async fn instance_statistics(&self) -> DbResult<InstanceStatistics>;

    /// Returns `None` when the organization already has a window.
    async fn insert_window_if_absent(
        &self,
        window: &NewGenerationWindow,
    ) -> DbResult<Option<GenerationWindow>>;

    async fn find_window(&self, organization_id: Uuid) -> DbResult<Option<GenerationWindow>>;

    async fn find_windows(&self, filter: &WindowFilter) -> DbResult<Vec<GenerationWindow>>;

    async fn update_window(
        &self,
        organization_id: Uuid,
        changes: &GenerationWindowChangeset,
    ) -> DbResult<usize>;
}

#[async_trait]
impl GenerationStore for DbPool {
    async fn find_template(&self, id: Uuid) -> DbResult<Option<RecurringTemplate>> {
        let mut conn = self.get_connection().await?;
        Ok(query::template::find_by_id(&mut conn, id).await?)
    }

    async fn find_templates(&self, ids: &[Uuid]) -> DbResult<Vec<RecurringTemplate>> {
        let mut conn = self.get_connection().await?;
        Ok(query::template::find_by_ids(&mut conn, ids).await?)
    }

    async fn list_recurring_templates(
        &self,
        organization_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<RecurringTemplate>> {
        let mut conn = self.get_connection().await?;
        Ok(query::template::list_recurring_page(&mut conn, organization_id, after, limit).await?)
    }

    async fn find_rule_for_template(&self, template_id: Uuid) -> DbResult<Option<RecurrenceRule>> {
        let mut conn = self.get_connection().await?;
        Ok(query::rule::find_by_template(&mut conn, template_id).await?)
    }

    async fn find_rules_for_templates(
        &self,
        template_ids: &[Uuid],
    ) -> DbResult<Vec<RecurrenceRule>> {
        let mut conn = self.get_connection().await?;
        Ok(query::rule::find_by_templates(&mut conn, template_ids).await?)
    }

    async fn insert_rule(&self, rule: &NewRecurrenceRule) -> DbResult<RecurrenceRule> {
        let mut conn = self.get_connection().await?;
        Ok(query::rule::insert(&mut conn, rule).await?)
    }

    async fn exceptions_for_template(&self, template_id: Uuid) -> DbResult<Vec<EventException>> {
        let mut conn = self.get_connection().await?;
        let rows = query::exception::find_by_template(&mut conn, template_id).await?;
        Ok(EventException::decode_rows(rows))
    }

    async fn exceptions_for_instances(
        &self,
        instance_ids: &[Uuid],
    ) -> DbResult<Vec<EventException>> {
        let mut conn = self.get_connection().await?;
        let rows = query::exception::find_by_instances(&mut conn, instance_ids).await?;
        Ok(EventException::decode_rows(rows))
    }

    async fn existing_start_times(
        &self,
        base_recurring_event_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<DateTime<Utc>>> {
        let mut conn = self.get_connection().await?;
        Ok(
            query::instance::existing_start_times(&mut conn, base_recurring_event_id, from, to)
                .await?,
        )
    }

    #[tracing::instrument(skip(self, instances), fields(rows = instances.len()))]
    async fn insert_instances(&self, instances: &[NewGeneratedInstance]) -> DbResult<usize> {
        if instances.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_connection().await?;
        match query::instance::insert_batch_ignore_conflicts(&mut conn, instances).await {
            Ok(inserted) => Ok(inserted),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
                tracing::debug!(
                    constraint = info.constraint_name(),
                    "Concurrent duplicate insert treated as a no-op"
                );
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_instances(&self, filter: &InstanceFilter) -> DbResult<Vec<GeneratedInstance>> {
        let mut conn = self.get_connection().await?;
        Ok(query::instance::find_filtered(&mut conn, filter).await?)
    }

    async fn count_instances(&self, filter: &InstanceFilter) -> DbResult<i64> {
        let mut conn = self.get_connection().await?;
        Ok(query::instance::count_filtered(&mut conn, filter).await?)
    }

    async fn delete_instances(&self, filter: &InstanceFilter) -> DbResult<usize> {
        let mut conn = self.get_connection().await?;
        Ok(query::instance::delete_filtered(&mut conn, filter).await?)
    }

    async fn purge_instances(&self, filter: &InstanceFilter) -> DbResult<PurgeOutcome> {
        let mut conn = self.get_connection().await?;
        let filter = filter.clone();

        with_transaction(&mut conn, |conn| {
            async move {
                let organizations = query::instance::organizations_filtered(conn, &filter).await?;
                let instances_deleted = query::instance::delete_filtered(conn, &filter).await?;
                Ok(PurgeOutcome {
                    instances_deleted,
                    organizations,
                })
            }
            .scope_boxed()
        })
        .await
    }

    async fn instance_statistics(&self) -> DbResult<InstanceStatistics> {
        let mut conn = self.get_connection().await?;
        Ok(query::instance::statistics(&mut conn).await?)
    }

    async fn insert_window_if_absent(
        &self,
        window: &NewGenerationWindow,
    ) -> DbResult<Option<GenerationWindow>> {
        let mut conn = self.get_connection().await?;
        Ok(query::window::insert_if_absent(&mut conn, window).await?)
    }

    async fn find_window(&self, organization_id: Uuid) -> DbResult<Option<GenerationWindow>> {
        let mut conn = self.get_connection().await?;
        Ok(query::window::find_by_organization(&mut conn, organization_id).await?)
    }

    async fn find_windows(&self, filter: &WindowFilter) -> DbResult<Vec<GenerationWindow>> {
        let mut conn = self.get_connection().await?;
        Ok(query::window::find_filtered(&mut conn, filter).await?)
    }

    async fn update_window(
        &self,
        organization_id: Uuid,
        changes: &GenerationWindowChangeset,
    ) -> DbResult<usize> {
        let mut conn = self.get_connection().await?;
        Ok(query::window::update(&mut conn, organization_id, changes).await?)
    }
}
