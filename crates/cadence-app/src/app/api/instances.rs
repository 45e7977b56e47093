use chrono::{DateTime, Utc};
use salvo::{Depot, Request, Response, Router, handler};

use cadence_service::generation::instances::{InstanceRangeQuery, get_instances_in_date_range};
use cadence_service::generation::resolver::ResolvedInstance;

use super::{ORGANIZATIONS_ROUTE_COMPONENT, uuid_param};
use crate::error::{AppError, AppResult, render_result};
use crate::worker_handler::get_service_from_depot;

fn query_string(req: &Request, name: &str) -> Option<String> {
    req.query::<String>(name).filter(|value| !value.is_empty())
}

fn required_time(req: &Request, name: &str) -> AppResult<DateTime<Utc>> {
    let raw = query_string(req, name)
        .ok_or_else(|| AppError::BadRequest(format!("missing query parameter `{name}`")))?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| AppError::BadRequest(format!("invalid {name} `{raw}`: {e}")))
}

fn parse_query(req: &Request) -> AppResult<InstanceRangeQuery> {
    let include_cancelled = query_string(req, "include_cancelled")
        .map(|raw| {
            raw.parse::<bool>().map_err(|_err| {
                AppError::BadRequest(format!("invalid include_cancelled `{raw}`"))
            })
        })
        .transpose()?
        .unwrap_or(false);
    let limit = query_string(req, "limit")
        .map(|raw| match raw.parse::<i64>() {
            Ok(limit) if limit > 0 => Ok(limit),
            _ => Err(AppError::BadRequest(format!("invalid limit `{raw}`"))),
        })
        .transpose()?;

    Ok(InstanceRangeQuery {
        organization_id: uuid_param(req, "organization_id")?,
        start: required_time(req, "start")?,
        end: required_time(req, "end")?,
        include_cancelled,
        limit,
    })
}

/// ## Summary
/// GET /api/organizations/{organization_id}/instances - resolved instances whose actual start
/// falls in `[start, end)`, ordered by start.
///
/// ## Errors
/// Returns HTTP 400 for a malformed organization id, range or limit.
#[handler]
async fn list_instances(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    render_result(res, load_instances(req, depot).await);
}

async fn load_instances(req: &mut Request, depot: &Depot) -> AppResult<Vec<ResolvedInstance>> {
    let query = parse_query(req)?;
    let service = get_service_from_depot(depot)?;
    Ok(get_instances_in_date_range(service.store(), &query).await?)
}

#[must_use]
pub fn routes() -> Router {
    Router::with_path(ORGANIZATIONS_ROUTE_COMPONENT)
        .push(Router::with_path("{organization_id}/instances").get(list_instances))
}
