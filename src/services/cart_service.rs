use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartView},
    entity::{
        cart_items::{self, ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Cart,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::finish,
    state::AppState,
};

#[derive(Debug, FromQueryResult)]
struct CartLineRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i32,
    product_name: String,
    product_price: i64,
    created_at: DateTimeWithTimeZone,
    updated_at: DateTimeWithTimeZone,
}

impl TryFrom<CartLineRow> for CartItemDto {
    type Error = AppError;

    fn try_from(row: CartLineRow) -> AppResult<Self> {
        let total_item_price = line_total(row.product_price, row.quantity)?;
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_price: row.product_price,
            quantity: row.quantity,
            total_item_price,
            created_at: row.created_at.with_timezone(&Utc),
            updated_at: row.updated_at.with_timezone(&Utc),
        })
    }
}

/// Price times quantity; prices can change after an item is carted, so the
/// product may not fit in an `i64`.
pub(crate) fn line_total(price: i64, quantity: i32) -> AppResult<i64> {
    price.checked_mul(i64::from(quantity)).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "line total overflows: price {price} x quantity {quantity}"
        ))
    })
}

/// Cart items of one cart joined with the live product name and price.
fn cart_lines(cart_id: Uuid) -> Select<CartItems> {
    CartItems::find()
        .select_only()
        .column(CartItemCol::Id)
        .column(CartItemCol::ProductId)
        .column(CartItemCol::Quantity)
        .column(CartItemCol::CreatedAt)
        .column(CartItemCol::UpdatedAt)
        .column_as(ProdCol::Name, "product_name")
        .column_as(ProdCol::Price, "product_price")
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .filter(CartItemCol::CartId.eq(cart_id))
}

pub(crate) async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    for_update: bool,
) -> AppResult<Option<CartModel>> {
    let mut finder = Carts::find().filter(CartCol::UserId.eq(user_id));
    if for_update {
        finder = finder.lock(LockType::Update);
    }
    Ok(finder.one(conn).await?)
}

/// Carts are created lazily; concurrent first requests race on the unique
/// `user_id` and the loser simply reads the winner's row.
pub(crate) async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    for_update: bool,
) -> AppResult<CartModel> {
    if let Some(cart) = find_cart(conn, user_id, for_update).await? {
        return Ok(cart);
    }

    let active = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total_amount: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    };
    Carts::insert(active)
        .on_conflict(OnConflict::column(CartCol::UserId).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await?;

    find_cart(conn, user_id, for_update)
        .await?
        .ok_or(AppError::CartNotFound)
}

/// Recomputes the cached cart total from current quantities and live prices.
pub(crate) async fn refresh_cart_total<C: ConnectionTrait>(
    conn: &C,
    cart: CartModel,
) -> AppResult<CartModel> {
    let total = CartItems::find()
        .select_only()
        .column_as(
            Expr::cust("CAST(COALESCE(SUM(products.price * cart_items.quantity), 0) AS BIGINT)"),
            "total",
        )
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .filter(CartItemCol::CartId.eq(cart.id))
        .into_tuple::<i64>()
        .one(conn)
        .await?
        .unwrap_or(0);

    let mut active: CartActive = cart.into();
    active.total_amount = Set(total);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

pub async fn get_cart(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartView>> {
    let (page, limit, offset) = pagination.normalize();
    let cart = find_or_create_cart(&state.orm, user.user_id, false).await?;

    let total = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .count(&state.orm)
        .await? as i64;

    let items = cart_lines(cart.id)
        .order_by_desc(CartItemCol::CreatedAt)
        .limit(limit as u64)
        .offset(offset as u64)
        .into_model::<CartLineRow>()
        .all(&state.orm)
        .await?
        .into_iter()
        .map(CartItemDto::try_from)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Cart Items Retrieved",
        CartView {
            cart: Cart::from(cart),
            items,
        },
        Some(meta),
    ))
}

pub async fn get_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartItemDto>> {
    let cart = find_cart(&state.orm, user.user_id, false)
        .await?
        .ok_or(AppError::NotFound("Cart item"))?;

    let item = cart_lines(cart.id)
        .filter(CartItemCol::Id.eq(item_id))
        .into_model::<CartLineRow>()
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Cart item"))?;

    Ok(ApiResponse::success(
        "Cart item retrieved",
        CartItemDto::try_from(item)?,
        None,
    ))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let txn = state.orm.begin().await?;
    let result = upsert_cart_item(&txn, user.user_id, &payload).await;
    let (cart, item_id) = finish(txn, result).await?;

    let item = cart_lines(cart.id)
        .filter(CartItemCol::Id.eq(item_id))
        .into_model::<CartLineRow>()
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Cart item"))?;

    tracing::debug!(
        user_id = %user.user_id,
        product_id = %payload.product_id,
        quantity = payload.quantity,
        cart_total = cart.total_amount,
        "cart item added"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product added to cart successfully",
        CartItemDto::try_from(item)?,
        None,
    ))
}

/// Stock is only checked here, never reserved; reservation happens at checkout.
async fn upsert_cart_item<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    payload: &AddToCartRequest,
) -> AppResult<(CartModel, Uuid)> {
    let product = Products::find_by_id(payload.product_id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    if product.stock < payload.quantity {
        return Err(AppError::InsufficientStock(product.name));
    }

    let cart = find_or_create_cart(conn, user_id, true).await?;

    let existing = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product.id))
        .one(conn)
        .await?;

    let item_id = match existing {
        Some(item) => {
            let quantity = item
                .quantity
                .checked_add(payload.quantity)
                .ok_or_else(|| AppError::BadRequest("quantity is too large".into()))?;
            let mut active: CartItemActive = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now().into());
            active.update(conn).await?.id
        }
        None => {
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(payload.quantity),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(conn)
            .await?
            .id
        }
    };

    let cart = refresh_cart_total(conn, cart).await?;
    Ok((cart, item_id))
}

pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<Cart>> {
    let txn = state.orm.begin().await?;
    let result = delete_cart_item(&txn, user.user_id, item_id).await;
    let cart = finish(txn, result).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "cart_item_id": item_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart item removed successfully",
        Cart::from(cart),
        None,
    ))
}

async fn delete_cart_item<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    item_id: Uuid,
) -> AppResult<CartModel> {
    let cart = find_cart(conn, user_id, true)
        .await?
        .ok_or(AppError::NotFound("Cart item"))?;

    let result = CartItems::delete_many()
        .filter(CartItemCol::Id.eq(item_id))
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Cart item"));
    }

    refresh_cart_total(conn, cart).await
}
