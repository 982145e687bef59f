use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/checkout", post(checkout))
        .route("/{id}", get(get_order))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders of the current user", body = ApiResponse<OrderList>),
        (status = 400, description = "Malformed query")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<OrderListQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let Query(query) = query.map_err(AppError::from)?;
    Ok(Json(order_service::list_orders(&state, &user, query).await?))
}

#[utoipa::path(
    post,
    path = "/api/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Order placed; the otp is returned only here", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Cart is empty or payload invalid"),
        (status = 404, description = "Cart not found"),
        (status = 409, description = "Insufficient stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<CheckoutResponse>>> {
    let Json(payload) = payload.map_err(AppError::from)?;
    Ok(Json(order_service::checkout(&state, &user, payload).await?))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items and payments", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let Path(id) = id.map_err(AppError::from)?;
    Ok(Json(order_service::get_order(&state, &user, id).await?))
}
