use uuid::Uuid;

use crate::{
    audit,
    dto::users::{ChangePasswordRequest, UpdateUserRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    response::ApiResponse,
    services::auth_service::{
        UserRecord, find_user_by_id, hash_password_blocking, validate_password,
        verify_password_blocking,
    },
    state::AppState,
};

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let record = find_user_by_id(&state.pool, user.user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(ApiResponse::success("Profile", User::from(record), None))
}

pub async fn update_me(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }

    let record = sqlx::query_as::<_, UserRecord>(
        "UPDATE users SET name = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(user.user_id)
    .bind(name)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("User"))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_update",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success("Profile updated", User::from(record), None))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    validate_password(&payload.new_password)?;

    let record = find_user_by_id(&state.pool, user.user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if !verify_password_blocking(payload.current_password, record.password_hash).await? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let password_hash = hash_password_blocking(payload.new_password).await?;
    update_password_hash(state, user.user_id, &password_hash).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "password_change",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password updated",
        serde_json::json!({}),
        None,
    ))
}

async fn update_password_hash(state: &AppState, id: Uuid, password_hash: &str) -> AppResult<()> {
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(password_hash)
        .execute(&state.pool)
        .await?;
    Ok(())
}
