use salvo::async_trait;
use std::sync::Arc;

use crate::error::AppResult;
use cadence_core::error::CoreError;
use cadence_service::worker::BackgroundWorkerService;

pub struct WorkerServiceHandler {
    pub service: Arc<BackgroundWorkerService>,
}

#[async_trait]
impl salvo::Handler for WorkerServiceHandler {
    #[tracing::instrument(skip(self, _req, depot, _res, _ctrl))]
    async fn handle(
        &self,
        _req: &mut salvo::Request,
        depot: &mut salvo::Depot,
        _res: &mut salvo::Response,
        _ctrl: &mut salvo::FlowCtrl,
    ) {
        depot.inject(Arc::clone(&self.service));
    }
}

/// ## Summary
/// Retrieves the background worker service from the depot.
///
/// ## Errors
/// Returns an error if the service is not found in the depot.
pub fn get_service_from_depot(depot: &salvo::Depot) -> AppResult<Arc<BackgroundWorkerService>> {
    depot
        .obtain::<Arc<BackgroundWorkerService>>()
        .cloned()
        .map_err(|_err| CoreError::InvariantViolation("Worker service not found in depot").into())
}
