use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::{OrderStatus, PaymentMethod},
    models::{Order, OrderItem, Payment},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub method: PaymentMethod,
}

/// Returned once by checkout. `otp` is the only copy of the payment secret.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub otp: String,
    pub total_amount: i64,
    pub payment_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct OrderList {
    #[schema(value_type = Vec<Order>)]
    pub items: Vec<Order>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}
