use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartItemDto, CartView},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Cart,
    response::ApiResponse,
    routes::params::Pagination,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).post(add_to_cart))
        .route("/{id}", get(get_cart_item).delete(remove_cart_item))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(Pagination),
    responses(
        (status = 200, description = "Cart with its items for the current user", body = ApiResponse<CartView>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let Query(pagination) = query.map_err(AppError::from)?;
    Ok(Json(
        cart_service::get_cart(&state, &user, pagination).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Add or increment a cart item", body = ApiResponse<CartItemDto>),
        (status = 400, description = "Invalid quantity"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Insufficient stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<AddToCartRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<CartItemDto>>> {
    let Json(payload) = payload.map_err(AppError::from)?;
    Ok(Json(
        cart_service::add_to_cart(&state, &user, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/cart/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Cart item", body = ApiResponse<CartItemDto>),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<CartItemDto>>> {
    let Path(id) = id.map_err(AppError::from)?;
    Ok(Json(cart_service::get_cart_item(&state, &user, id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Item removed, cart total recomputed", body = ApiResponse<Cart>),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let Path(id) = id.map_err(AppError::from)?;
    Ok(Json(
        cart_service::remove_cart_item(&state, &user, id).await?,
    ))
}
