use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    entity::{OrderStatus, PaymentStatus},
    error::{AppError, AppResult},
};

/// Raw webhook query. Fields stay strings so malformed values map to a 400
/// envelope instead of an extractor rejection.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaymentWebhookQuery {
    /// Payment ID returned by checkout
    #[serde(rename = "paymentId")]
    pub payment_id: String,
    /// One of paid, unpaid, failed
    pub status: String,
    /// One-time secret returned by checkout
    pub otp: String,
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub otp: String,
}

impl TryFrom<PaymentWebhookQuery> for PaymentConfirmation {
    type Error = AppError;

    fn try_from(query: PaymentWebhookQuery) -> AppResult<Self> {
        let payment_id = Uuid::parse_str(query.payment_id.trim())
            .map_err(|_| AppError::BadRequest("Invalid Payment ID".into()))?;
        let status = query.status.trim().parse::<PaymentStatus>()?;
        if query.otp.is_empty() {
            return Err(AppError::BadRequest("otp is required".into()));
        }
        Ok(Self {
            payment_id,
            status,
            otp: query.otp,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentConfirmed {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    /// Present only when the confirmation settled the order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
}
