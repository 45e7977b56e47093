use salvo::Response;
use salvo::http::StatusCode;
use salvo::writing::Json;
use serde::Serialize;
use thiserror::Error;

use cadence_core::error::CoreError;
use cadence_service::error::ServiceError;

/// Application-level errors (HTTP layer)
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    ServiceError(#[from] ServiceError),

    #[error(transparent)]
    CoreError(#[from] CoreError),

    #[error("{0}")]
    BadRequest(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

/// ## Summary
/// Error response payload
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::ServiceError(
                ServiceError::ValidationError(_)
                | ServiceError::CoreError(CoreError::ParseError(_)),
            ) => StatusCode::BAD_REQUEST,
            Self::ServiceError(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::ServiceError(ServiceError::NotRunning) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// ## Summary
/// Renders a handler outcome: the value as JSON, or the error as `{ "error": message }`
/// with its mapped status code.
pub fn render_result<T: Serialize + Send>(res: &mut Response, result: AppResult<T>) {
    match result {
        Ok(body) => {
            res.render(Json(body));
        }
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                tracing::error!(error = %e, "Request failed");
            } else {
                tracing::debug!(error = %e, status = status.as_u16(), "Request rejected");
            }
            res.status_code(status);
            res.render(Json(ErrorResponse {
                error: e.to_string(),
            }));
        }
    }
}
