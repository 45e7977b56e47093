use salvo::{Depot, Request, Response, handler};

use cadence_service::worker::ServiceStatus;
use cadence_service::worker::pipeline::{WorkerConfig, WorkerConfigUpdate};

use super::json_body;
use crate::error::{AppResult, render_result};
use crate::worker_handler::get_service_from_depot;

/// ## Summary
/// GET /api/admin/status - schedules, run state and the active materialization settings.
#[handler]
pub async fn status(depot: &mut Depot, res: &mut Response) {
    let result: AppResult<ServiceStatus> =
        get_service_from_depot(depot).map(|service| service.get_status());
    render_result(res, result);
}

/// ## Summary
/// PATCH /api/admin/config - merges the given materialization settings.
///
/// ## Side Effects
/// Subsequent materialization runs use the merged settings.
///
/// ## Errors
/// Returns HTTP 400 if the body is not a valid settings update.
#[handler]
pub async fn update_config(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, apply_update(req, depot).await);
}

async fn apply_update(req: &mut Request, depot: &Depot) -> AppResult<WorkerConfig> {
    let update: WorkerConfigUpdate = json_body(req).await?;
    let service = get_service_from_depot(depot)?;
    Ok(service.update_materialization_config(&update))
}
