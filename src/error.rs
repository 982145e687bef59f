use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::response::{ApiResponse, ErrorBody};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Cart not found")]
    CartNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("{0}")]
    Unauthorized(String),

    #[error("Unauthorized payment")]
    UnauthorizedPayment,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::CartNotFound | AppError::PaymentNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::BadRequest(_) | AppError::EmptyCart => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::UnauthorizedPayment => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) | AppError::InsufficientStock(_) => StatusCode::CONFLICT,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable identifier clients can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::CartNotFound => "cart_not_found",
            AppError::PaymentNotFound => "payment_not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::EmptyCart => "empty_cart",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::UnauthorizedPayment => "unauthorized_payment",
            AppError::Forbidden => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::InsufficientStock(_) => "insufficient_stock",
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                "internal_error"
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        // Internal causes stay in the logs; clients only see the generic message.
        match &self {
            AppError::DbError(err) => tracing::error!(error = %err, "database error"),
            AppError::OrmError(err) => tracing::error!(error = %err, "orm error"),
            AppError::Internal(err) => tracing::error!(error = ?err, "internal error"),
            _ => {}
        }

        let body = ApiResponse::<()>::error(
            message.clone(),
            ErrorBody {
                code: self.code().to_string(),
                detail: message,
            },
        );

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
