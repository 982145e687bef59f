use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    entity::products::{ActiveModel, Column, Entity as Products},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    services::constraint_error,
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category_id) = query.category_id {
        condition = condition.add(Column::CategoryId.eq(category_id));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_col = match query.sort_by.unwrap_or(ProductSortBy::CreatedAt) {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    Ok(ApiResponse::success("Product", Product::from(product), None))
}

fn validate_fields(name: Option<&str>, price: Option<i64>, stock: Option<i32>) -> AppResult<()> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    if price.is_some_and(|p| p < 0) {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_fields(
        Some(&payload.name),
        Some(payload.price),
        Some(payload.stock),
    )?;

    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock),
        category_id: Set(payload.category_id),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| constraint_error(e, "Product"))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        None,
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_fields(payload.name.as_deref(), payload.price, payload.stock)?;

    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(Some(category_id));
    }
    active.updated_at = Set(Utc::now().into());

    let product = active
        .update(&state.orm)
        .await
        .map_err(|e| constraint_error(e, "Product"))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success("Updated", Product::from(product), None))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Product"));
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), None))
}
