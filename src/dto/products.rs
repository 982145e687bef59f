use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub stock: Option<i32>,
    pub category_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}
