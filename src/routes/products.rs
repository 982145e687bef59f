use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{categories::CategoryList, products::ProductList},
    error::{AppError, AppResult},
    models::Product,
    response::ApiResponse,
    routes::params::{Pagination, ProductQuery},
    services::{category_service, product_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
}

pub fn categories_router() -> Router<AppState> {
    Router::new().route("/", get(list_categories))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductQuery),
    responses(
        (status = 200, description = "List products", body = ApiResponse<ProductList>),
        (status = 400, description = "Malformed query")
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let Query(query) = query.map_err(AppError::from)?;
    Ok(Json(product_service::list_products(&state, query).await?))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product detail", body = ApiResponse<Product>),
        (status = 404, description = "Product not found")
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let Path(id) = id.map_err(AppError::from)?;
    Ok(Json(product_service::get_product(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/categories",
    params(Pagination),
    responses(
        (status = 200, description = "List categories", body = ApiResponse<CategoryList>)
    ),
    tag = "Products"
)]
pub async fn list_categories(
    State(state): State<AppState>,
    query: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let Query(pagination) = query.map_err(AppError::from)?;
    Ok(Json(
        category_service::list_categories(&state, pagination).await?,
    ))
}
