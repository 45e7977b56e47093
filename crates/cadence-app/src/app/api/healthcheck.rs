use salvo::http::StatusCode;
use salvo::writing::Json;
use salvo::{Depot, Response, Router, handler};

use crate::error::render_result;
use crate::worker_handler::get_service_from_depot;

/// ## Summary
/// Reports whether the background workers are running: 200 when healthy, 503 otherwise.
#[handler]
async fn healthcheck(depot: &mut Depot, res: &mut Response) {
    let service = match get_service_from_depot(depot) {
        Ok(service) => service,
        Err(e) => return render_result::<()>(res, Err(e)),
    };

    let report = service.health_check();
    if !report.is_healthy() {
        res.status_code(StatusCode::SERVICE_UNAVAILABLE);
    }
    res.render(Json(report));
}

#[must_use]
pub fn routes() -> Router {
    Router::with_path("healthcheck").get(healthcheck)
}
