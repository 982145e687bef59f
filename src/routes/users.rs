use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, patch},
};

use crate::{
    dto::users::{ChangePasswordRequest, UpdateUserRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    response::ApiResponse,
    services::user_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).patch(update_me))
        .route("/change-password", patch(change_password))
}

#[utoipa::path(
    get,
    path = "/api/user/me",
    responses(
        (status = 200, description = "Current user profile", body = ApiResponse<User>),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    Ok(Json(user_service::me(&state, &user).await?))
}

#[utoipa::path(
    patch,
    path = "/api/user/me",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated profile", body = ApiResponse<User>),
        (status = 400, description = "Invalid payload")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<User>>> {
    let Json(payload) = payload.map_err(AppError::from)?;
    Ok(Json(user_service::update_me(&state, &user, payload).await?))
}

#[utoipa::path(
    patch,
    path = "/api/user/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Current password is incorrect or new password too short")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let Json(payload) = payload.map_err(AppError::from)?;
    Ok(Json(
        user_service::change_password(&state, &user, payload).await?,
    ))
}
