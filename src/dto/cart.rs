use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Cart;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// A cart line joined with the live product it points at.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemDto {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_price: i64,
    pub quantity: i32,
    pub total_item_price: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub cart: Cart,
    pub items: Vec<CartItemDto>,
}
