use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    routing::{patch, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        categories::{CreateCategoryRequest, UpdateCategoryRequest},
        orders::UpdateOrderStatusRequest,
        products::{CreateProductRequest, UpdateProductRequest},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Category, Order, Product},
    response::ApiResponse,
    services::{admin_service, category_service, product_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/{id}", patch(update_product).delete(delete_product))
        .route("/categories", post(create_category))
        .route(
            "/categories/{id}",
            patch(update_category).delete(delete_category),
        )
        .route("/orders/{id}/status", patch(update_order_status))
}

#[utoipa::path(
    post,
    path = "/api/admin/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<Product>),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Product name already exists"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    let Json(payload) = payload.map_err(AppError::from)?;
    let resp = product_service::create_product(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    patch,
    path = "/api/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<Product>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let Path(id) = id.map_err(AppError::from)?;
    let Json(payload) = payload.map_err(AppError::from)?;
    Ok(Json(
        product_service::update_product(&state, &user, id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product deleted", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let Path(id) = id.map_err(AppError::from)?;
    Ok(Json(
        product_service::delete_product(&state, &user, id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/admin/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = ApiResponse<Category>),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Category name already exists"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<Category>>)> {
    let Json(payload) = payload.map_err(AppError::from)?;
    let resp = category_service::create_category(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    patch,
    path = "/api/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = ApiResponse<Category>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Category not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateCategoryRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let Path(id) = id.map_err(AppError::from)?;
    let Json(payload) = payload.map_err(AppError::from)?;
    Ok(Json(
        category_service::update_category(&state, &user, id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category deleted", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Category not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let Path(id) = id.map_err(AppError::from)?;
    Ok(Json(
        category_service::delete_category(&state, &user, id).await?,
    ))
}

#[utoipa::path(
    patch,
    path = "/api/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated", body = ApiResponse<Order>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateOrderStatusRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let Path(id) = id.map_err(AppError::from)?;
    let Json(payload) = payload.map_err(AppError::from)?;
    Ok(Json(
        admin_service::update_order_status(&state, &user, id, payload).await?,
    ))
}
