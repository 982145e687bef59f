use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, QuerySelect, Set, TransactionTrait};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::UpdateOrderStatusRequest,
    entity::{
        OrderStatus,
        orders::{ActiveModel as OrderActive, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Order,
    response::ApiResponse,
    services::finish,
    state::AppState,
};

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let result = transition_order(&txn, id, payload.status).await;
    let (previous, order) = finish(txn, result).await?;

    tracing::info!(
        order_id = %order.id,
        from = previous.as_str(),
        to = order.status.as_str(),
        "order status updated"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": previous, "to": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        Order::from(order),
        None,
    ))
}

async fn transition_order<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    status: OrderStatus,
) -> AppResult<(OrderStatus, OrderModel)> {
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let previous = existing.status;
    let next = previous.transition_to(status)?;
    if next == previous {
        return Ok((previous, existing));
    }

    let mut active: OrderActive = existing.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    Ok((previous, active.update(conn).await?))
}
