use chrono::{DateTime, Utc};
use salvo::{Depot, Request, Response, handler};
use serde::{Deserialize, Serialize};

use cadence_service::window::{WindowStatus, extend_generation_window, get_window_status};
use cadence_service::worker::cleanup::{OrganizationCleanupStatus, get_organization_cleanup_status};

use super::json_body;
use crate::app::api::uuid_param;
use crate::error::{AppError, AppResult, render_result};
use crate::worker_handler::get_service_from_depot;

#[derive(Debug, Deserialize)]
pub struct ExtendWindowRequest {
    pub months: u32,
}

#[derive(Debug, Serialize)]
pub struct ExtendWindowResponse {
    pub current_window_end_date: DateTime<Utc>,
}

/// ## Summary
/// GET /api/admin/organizations/{organization_id}/window
#[handler]
pub async fn window_status(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, load_window_status(req, depot).await);
}

async fn load_window_status(req: &mut Request, depot: &Depot) -> AppResult<WindowStatus> {
    let organization_id = uuid_param(req, "organization_id")?;
    let service = get_service_from_depot(depot)?;
    Ok(get_window_status(service.store(), organization_id).await?)
}

/// ## Summary
/// POST /api/admin/organizations/{organization_id}/window/extend - pushes the window end
/// out by `months`.
///
/// ## Side Effects
/// Updates the organization's window; the next materialization pass fills the new range.
#[handler]
pub async fn extend_window(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, extend(req, depot).await);
}

async fn extend(req: &mut Request, depot: &Depot) -> AppResult<ExtendWindowResponse> {
    let organization_id = uuid_param(req, "organization_id")?;
    let body: ExtendWindowRequest = json_body(req).await?;
    if body.months == 0 {
        return Err(AppError::BadRequest("months must be at least 1".to_owned()));
    }

    let service = get_service_from_depot(depot)?;
    let current_window_end_date =
        extend_generation_window(service.store(), organization_id, body.months).await?;
    Ok(ExtendWindowResponse {
        current_window_end_date,
    })
}

/// ## Summary
/// GET /api/admin/organizations/{organization_id}/cleanup - what a sweep would delete.
#[handler]
pub async fn cleanup_status(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, load_cleanup_status(req, depot).await);
}

async fn load_cleanup_status(req: &mut Request, depot: &Depot) -> AppResult<OrganizationCleanupStatus> {
    let organization_id = uuid_param(req, "organization_id")?;
    let service = get_service_from_depot(depot)?;
    Ok(get_organization_cleanup_status(service.store(), organization_id, Utc::now()).await?)
}
