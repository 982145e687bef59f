use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    OrderStatus, PaymentMethod, PaymentStatus, carts, categories, order_items, orders, payments,
    products, users,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<categories::Model> for Category {
    fn from(model: categories::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub category_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            stock: model.stock,
            category_id: model.category_id,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_amount: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<carts::Model> for Cart {
    fn from(model: carts::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            total_amount: model.total_amount,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            status: model.status,
            total_amount: model.total_amount,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub price_at_purchase: i64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            price_at_purchase: model.price_at_purchase,
            quantity: model.quantity,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

/// Public view of a payment. The OTP hash never leaves the service layer.
#[derive(Debug, Serialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: PaymentStatus,
    pub amount: i64,
    pub method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<payments::Model> for Payment {
    fn from(model: payments::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            status: model.status,
            amount: model.amount,
            method: model.method,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}
