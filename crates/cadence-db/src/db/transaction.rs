//! Transaction helper utilities for database operations.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use diesel_async::scoped_futures::ScopedFutureExt;
//! use crate::db::transaction::with_transaction;
//!
//! with_transaction(&mut conn, |conn| async move {
//!     let affected = instance::organizations_ended_before(conn, cutoff).await?;
//!     let deleted = instance::delete_ended_before(conn, None, cutoff).await?;
//!     Ok((deleted, affected))
//! }.scope_boxed()).await?;
//! ```

use diesel_async::{AsyncConnection, scoped_futures::ScopedBoxFuture};

use crate::db::connection::DbConnection;
use crate::error::DbError;

/// ## Summary
/// Runs a database transaction and returns the closure result.
///
/// ## Errors
/// Returns any error produced by the closure, or errors raised while starting
/// or committing the transaction.
pub async fn with_transaction<'conn, 'pool, T, F>(
    conn: &'conn mut DbConnection<'pool>,
    callback: F,
) -> Result<T, DbError>
where
    F: for<'r> FnOnce(&'r mut DbConnection<'pool>) -> ScopedBoxFuture<'conn, 'r, Result<T, DbError>>
        + Send
        + 'conn,
    T: Send + 'conn,
{
    conn.transaction::<_, DbError, _>(callback).await
}
