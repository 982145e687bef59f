use sea_orm::{DatabaseTransaction, DbErr, SqlErr};

use crate::error::{AppError, AppResult};

pub mod admin_service;
pub mod auth_service;
pub mod cart_service;
pub mod category_service;
pub mod order_service;
pub mod payment_service;
pub mod product_service;
pub mod user_service;

/// Commits on success and rolls back explicitly on failure, returning the
/// original error. A failed rollback is only logged.
pub(crate) async fn finish<T>(txn: DatabaseTransaction, result: AppResult<T>) -> AppResult<T> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::error!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

/// Maps constraint violations on catalog writes to client errors.
pub(crate) fn constraint_error(err: DbErr, what: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict(format!("{what} already exists"))
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            AppError::BadRequest(format!("{what} references a missing record"))
        }
        _ => AppError::from(err),
    }
}
