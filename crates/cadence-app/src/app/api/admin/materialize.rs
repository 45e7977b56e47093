use salvo::{Depot, Request, Response, handler};

use cadence_service::worker::pipeline::WorkerResult;

use crate::app::api::uuid_param;
use crate::error::{AppResult, render_result};
use crate::worker_handler::get_service_from_depot;

/// ## Summary
/// POST /api/admin/materialize - runs a full materialization pass now.
///
/// ## Errors
/// Returns HTTP 409 while the background workers are stopped.
#[handler]
pub async fn materialize_all(depot: &mut Depot, res: &mut Response) {
    render_result(res, run_all(depot).await);
}

async fn run_all(depot: &Depot) -> AppResult<WorkerResult> {
    let service = get_service_from_depot(depot)?;
    Ok(service.trigger_materialization().await?)
}

/// ## Summary
/// POST /api/admin/materialize/{organization_id} - materializes one organization now,
/// whether or not it is due.
///
/// ## Errors
/// Returns HTTP 404 if the organization has no window, 409 while stopped.
#[handler]
pub async fn materialize_organization(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, run_organization(req, depot).await);
}

async fn run_organization(req: &mut Request, depot: &Depot) -> AppResult<WorkerResult> {
    let organization_id = uuid_param(req, "organization_id")?;
    let service = get_service_from_depot(depot)?;
    Ok(service
        .trigger_materialization_for_organization(organization_id)
        .await?)
}
