use thiserror::Error;
use uuid::Uuid;

/// Database layer errors
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),

    #[error("Pool error: {0}")]
    PoolError(#[from] diesel_async::pooled_connection::bb8::RunError),

    #[error("Invalid override payload on exception {exception_id}: {source}")]
    InvalidExceptionPayload {
        exception_id: Uuid,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    CoreError(#[from] cadence_core::error::CoreError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;
