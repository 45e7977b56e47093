use chrono::{DateTime, Utc};
use salvo::{Depot, Request, Response, handler};
use serde::Deserialize;

use cadence_service::worker::cleanup::{
    CleanupStats, EmergencyCleanupResult, GlobalCleanupStatistics, OrganizationCleanupResult,
    get_global_cleanup_statistics,
};

use super::json_body;
use crate::app::api::uuid_param;
use crate::error::{AppResult, render_result};
use crate::worker_handler::get_service_from_depot;

#[derive(Debug, Deserialize)]
pub struct EmergencyCleanupRequest {
    pub cutoff: DateTime<Utc>,
}

/// ## Summary
/// POST /api/admin/cleanup - runs the retention sweep now.
#[handler]
pub async fn cleanup_all(depot: &mut Depot, res: &mut Response) {
    render_result(res, sweep_all(depot).await);
}

async fn sweep_all(depot: &Depot) -> AppResult<CleanupStats> {
    let service = get_service_from_depot(depot)?;
    Ok(service.trigger_cleanup().await?)
}

/// ## Summary
/// POST /api/admin/cleanup/{organization_id} - sweeps one organization now.
#[handler]
pub async fn cleanup_organization(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, sweep_organization(req, depot).await);
}

async fn sweep_organization(req: &mut Request, depot: &Depot) -> AppResult<OrganizationCleanupResult> {
    let organization_id = uuid_param(req, "organization_id")?;
    let service = get_service_from_depot(depot)?;
    Ok(service.trigger_cleanup_for_organization(organization_id).await?)
}

/// ## Summary
/// POST /api/admin/cleanup/emergency - deletes every instance that ended before `cutoff`,
/// ignoring retention settings.
///
/// ## Side Effects
/// Irreversibly deletes generated instances across all organizations.
///
/// ## Errors
/// Returns HTTP 400 without a valid `cutoff`, 409 while stopped.
#[handler]
pub async fn emergency_cleanup(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, purge(req, depot).await);
}

async fn purge(req: &mut Request, depot: &Depot) -> AppResult<EmergencyCleanupResult> {
    let body: EmergencyCleanupRequest = json_body(req).await?;
    let service = get_service_from_depot(depot)?;
    Ok(service.trigger_emergency_cleanup(body.cutoff).await?)
}

/// ## Summary
/// GET /api/admin/cleanup/statistics - table-wide instance totals.
#[handler]
pub async fn statistics(depot: &mut Depot, res: &mut Response) {
    render_result(res, load_statistics(depot).await);
}

async fn load_statistics(depot: &Depot) -> AppResult<GlobalCleanupStatistics> {
    let service = get_service_from_depot(depot)?;
    Ok(get_global_cleanup_statistics(service.store()).await?)
}
