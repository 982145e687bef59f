use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, FromQueryResult,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems},
    entity::{
        OrderStatus, PaymentMethod, PaymentStatus,
        cart_items::{self, Column as CartItemCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, Payment},
    otp,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        cart_service::{find_cart, line_total, refresh_cart_total},
        finish,
    },
    state::AppState,
};

/// One cart line joined with the product row it reserves from.
#[derive(Debug, FromQueryResult)]
struct CheckoutLine {
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    price: i64,
    stock: i32,
}

struct PlacedOrder {
    order_id: Uuid,
    payment_id: Uuid,
    total_amount: i64,
    otp: String,
    line_count: usize,
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let txn = state.orm.begin().await?;
    let result = place_order(&txn, user.user_id, payload.method).await;
    let placed = match finish(txn, result).await {
        Ok(placed) => placed,
        Err(err) => {
            tracing::info!(user_id = %user.user_id, error = %err, "checkout rejected");
            return Err(err);
        }
    };

    tracing::info!(
        user_id = %user.user_id,
        order_id = %placed.order_id,
        payment_id = %placed.payment_id,
        total_amount = placed.total_amount,
        lines = placed.line_count,
        "checkout completed"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "checkout",
        "orders",
        serde_json::json!({
            "order_id": placed.order_id,
            "payment_id": placed.payment_id,
            "total_amount": placed.total_amount,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout successful",
        CheckoutResponse {
            order_id: placed.order_id,
            otp: placed.otp,
            total_amount: placed.total_amount,
            payment_id: placed.payment_id,
        },
        None,
    ))
}

/// Turns the caller's cart into a pending order with an unpaid payment.
/// Every write goes through `conn`; the caller owns commit and rollback.
async fn place_order<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    method: PaymentMethod,
) -> AppResult<PlacedOrder> {
    let cart = find_cart(conn, user_id, true)
        .await?
        .ok_or(AppError::CartNotFound)?;

    // Locks are taken in product id order so concurrent checkouts sharing
    // products cannot deadlock.
    let lines = CartItems::find()
        .select_only()
        .column(CartItemCol::ProductId)
        .column(CartItemCol::Quantity)
        .column_as(ProdCol::Name, "product_name")
        .column_as(ProdCol::Price, "price")
        .column_as(ProdCol::Stock, "stock")
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::ProductId)
        .lock(LockType::Update)
        .into_model::<CheckoutLine>()
        .all(conn)
        .await?;

    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }

    let cart = refresh_cart_total(conn, cart).await?;
    let line_sum = lines.iter().try_fold(0i64, |sum, line| {
        let total = line_total(line.price, line.quantity)?;
        sum.checked_add(total)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order total overflows")))
    })?;
    if line_sum != cart.total_amount {
        return Err(AppError::Internal(anyhow::anyhow!(
            "cart total {} does not match line sum {}",
            cart.total_amount,
            line_sum
        )));
    }

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        status: Set(OrderStatus::Pending),
        total_amount: Set(cart.total_amount),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;

    for line in &lines {
        reserve_line(conn, order.id, line).await?;
    }

    let otp = otp::generate_otp();
    let otp_hash = otp::hash_otp_blocking(otp.clone()).await?;

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        status: Set(PaymentStatus::Unpaid),
        amount: Set(order.total_amount),
        method: Set(method),
        otp_hash: Set(otp_hash),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(conn)
        .await?;
    refresh_cart_total(conn, cart).await?;

    Ok(PlacedOrder {
        order_id: order.id,
        payment_id: payment.id,
        total_amount: order.total_amount,
        otp,
        line_count: lines.len(),
    })
}

/// Decrements stock only if enough remains, then snapshots the line price.
async fn reserve_line<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    line: &CheckoutLine,
) -> AppResult<()> {
    if line.quantity <= 0 {
        return Err(AppError::BadRequest("Cart has invalid quantity".into()));
    }
    if line.stock < line.quantity {
        return Err(AppError::InsufficientStock(line.product_name.clone()));
    }

    let updated = Products::update_many()
        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
        .col_expr(ProdCol::UpdatedAt, Expr::current_timestamp().into())
        .filter(ProdCol::Id.eq(line.product_id))
        .filter(ProdCol::Stock.gte(line.quantity))
        .exec(conn)
        .await?;
    if updated.rows_affected == 0 {
        return Err(AppError::InsufficientStock(line.product_name.clone()));
    }

    OrderItemActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        product_id: Set(Some(line.product_id)),
        price_at_purchase: Set(line.price),
        quantity: Set(line.quantity),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;

    Ok(())
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders retrieved",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let data = load_order_details(&state.orm, order).await?;
    Ok(ApiResponse::success("Order retrieved", data, None))
}

pub(crate) async fn load_order_details<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    let payments = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .order_by_asc(PaymentCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(Payment::from)
        .collect();

    Ok(OrderWithItems {
        order: Order::from(order),
        items,
        payments,
    })
}

