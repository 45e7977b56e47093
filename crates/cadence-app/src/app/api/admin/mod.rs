//! Operator endpoints under `/api/admin`.

mod cleanup;
mod materialize;
mod organizations;
mod series;
mod status;

use salvo::{Request, Router};
use serde::de::DeserializeOwned;

use super::{ADMIN_ROUTE_COMPONENT, ORGANIZATIONS_ROUTE_COMPONENT};
use crate::error::{AppError, AppResult};

#[must_use]
pub fn routes() -> Router {
    Router::with_path(ADMIN_ROUTE_COMPONENT)
        .push(Router::with_path("status").get(status::status))
        .push(Router::with_path("config").patch(status::update_config))
        .push(
            Router::with_path("materialize")
                .post(materialize::materialize_all)
                .push(Router::with_path("{organization_id}").post(materialize::materialize_organization)),
        )
        .push(
            Router::with_path("cleanup")
                .post(cleanup::cleanup_all)
                .push(Router::with_path("emergency").post(cleanup::emergency_cleanup))
                .push(Router::with_path("statistics").get(cleanup::statistics))
                .push(Router::with_path("{organization_id}").post(cleanup::cleanup_organization)),
        )
        .push(
            Router::with_path(ORGANIZATIONS_ROUTE_COMPONENT).push(
                Router::with_path("{organization_id}")
                    .push(
                        Router::with_path("window")
                            .get(organizations::window_status)
                            .push(Router::with_path("extend").post(organizations::extend_window)),
                    )
                    .push(Router::with_path("cleanup").get(organizations::cleanup_status)),
            ),
        )
        .push(
            Router::with_path("series/{template_id}")
                .push(Router::with_path("rule").post(series::register_rule))
                .push(Router::with_path("materialize").post(series::materialize_series)),
        )
}

/// ## Summary
/// Parses the JSON request body.
///
/// ## Errors
/// Returns [`AppError::BadRequest`] if the body is missing or malformed.
async fn json_body<T: DeserializeOwned>(req: &mut Request) -> AppResult<T> {
    req.parse_json::<T>()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid request body: {e}")))
}
