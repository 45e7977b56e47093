use thiserror::Error;
use uuid::Uuid;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    DatabaseError(#[from] cadence_db::error::DbError),

    #[error(transparent)]
    CoreError(#[from] cadence_core::error::CoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Recurrence rule {rule_id} has no original series id")]
    MissingSeries { rule_id: Uuid },

    #[error("Invalid recurrence rule {rule_id}: {reason}")]
    InvalidRule { rule_id: Uuid, reason: String },

    #[error("Background worker service is not running")]
    NotRunning,

    #[error("Missing dependency: {0}")]
    MissingDependency(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
