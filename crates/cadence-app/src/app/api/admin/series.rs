use salvo::{Depot, Request, Response, handler};
use serde::{Deserialize, Serialize};

use cadence_db::model::rule::RecurrenceRule;
use cadence_service::generation::materialize::{materialize_new_series, register_recurrence_rule};

use super::json_body;
use crate::app::api::uuid_param;
use crate::error::{AppResult, render_result};
use crate::worker_handler::get_service_from_depot;

#[derive(Debug, Deserialize)]
pub struct RegisterRuleRequest {
    /// RFC 5545 rule text, with or without the `RRULE:` prefix.
    pub rrule: String,
}

#[derive(Debug, Serialize)]
pub struct MaterializeSeriesResponse {
    pub instances_created: usize,
}

/// ## Summary
/// POST /api/admin/series/{template_id}/rule - attaches a rule parsed from iCalendar text.
///
/// ## Errors
/// Returns HTTP 400 for unsupported rule text, 404 for an unknown template.
#[handler]
pub async fn register_rule(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, register(req, depot).await);
}

async fn register(req: &mut Request, depot: &Depot) -> AppResult<RecurrenceRule> {
    let template_id = uuid_param(req, "template_id")?;
    let body: RegisterRuleRequest = json_body(req).await?;
    let service = get_service_from_depot(depot)?;
    Ok(register_recurrence_rule(service.store(), template_id, &body.rrule).await?)
}

/// ## Summary
/// POST /api/admin/series/{template_id}/materialize - first materialization of a new series
/// through its organization's hot window.
#[handler]
pub async fn materialize_series(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, materialize(req, depot).await);
}

async fn materialize(req: &mut Request, depot: &Depot) -> AppResult<MaterializeSeriesResponse> {
    let template_id = uuid_param(req, "template_id")?;
    let service = get_service_from_depot(depot)?;
    let instances_created = materialize_new_series(service.store(), template_id).await?;
    Ok(MaterializeSeriesResponse { instances_created })
}
