mod admin;
mod healthcheck;
mod instances;

use salvo::{Request, Router};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

// Re-export route constants from core
pub use cadence_core::constants::{
    ADMIN_ROUTE_COMPONENT, ADMIN_ROUTE_PREFIX, API_ROUTE_COMPONENT, API_ROUTE_PREFIX,
    ORGANIZATIONS_ROUTE_COMPONENT,
};

/// ## Summary
/// Constructs the API router: health, administration and the instance read path.
#[must_use]
pub fn routes() -> Router {
    Router::with_path(API_ROUTE_COMPONENT)
        .push(healthcheck::routes())
        .push(admin::routes())
        .push(instances::routes())
}

/// ## Summary
/// Reads a UUID path parameter.
///
/// ## Errors
/// Returns [`AppError::BadRequest`] if the parameter is missing or not a UUID.
pub(crate) fn uuid_param(req: &Request, name: &str) -> AppResult<Uuid> {
    let raw = req
        .param::<String>(name)
        .ok_or_else(|| AppError::BadRequest(format!("missing path parameter `{name}`")))?;
    Uuid::parse_str(&raw)
        .map_err(|e| AppError::BadRequest(format!("invalid {name} `{raw}`: {e}")))
}
