use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};

use crate::{
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest},
    error::{AppError, AppResult},
    models::User,
    response::ApiResponse,
    services::auth_service::{login_user, register_user},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register user", body = ApiResponse<User>),
        (status = 400, description = "Invalid payload or email already taken")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let Json(payload) = payload.map_err(AppError::from)?;
    let resp = register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login user", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let Json(payload) = payload.map_err(AppError::from)?;
    let resp = login_user(&state, payload).await?;
    Ok(Json(resp))
}
