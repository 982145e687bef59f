use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set};
use uuid::Uuid;

use crate::{
    audit,
    dto::categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
    entity::categories::{ActiveModel, Column, Entity as Categories},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Category,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::constraint_error,
    state::AppState,
};

pub async fn list_categories(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<CategoryList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Categories::find().order_by_asc(Column::Name);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }

    let category = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(payload.description),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| constraint_error(e, "Category"))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created",
        Category::from(category),
        None,
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let existing = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Category"))?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("name must not be empty".into()));
        }
        active.name = Set(name.to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    active.updated_at = Set(Utc::now().into());

    let category = active
        .update(&state.orm)
        .await
        .map_err(|e| constraint_error(e, "Category"))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "category_update",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category updated",
        Category::from(category),
        None,
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Categories::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Category"));
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "category_delete",
        "categories",
        serde_json::json!({ "category_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), None))
}
