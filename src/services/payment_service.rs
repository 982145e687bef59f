use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, QuerySelect, Set, TransactionTrait};

use crate::{
    audit,
    dto::payments::{PaymentConfirmation, PaymentConfirmed},
    entity::{
        OrderStatus, PaymentStatus,
        orders::{ActiveModel as OrderActive, Entity as Orders},
        payments::{ActiveModel as PaymentActive, Entity as Payments},
    },
    error::{AppError, AppResult},
    otp,
    response::ApiResponse,
    services::finish,
    state::AppState,
};

/// Applies a gateway callback. The payment and, when settled, its order are
/// updated in one transaction; nothing changes unless the secret verifies.
pub async fn confirm_payment(
    state: &AppState,
    confirmation: PaymentConfirmation,
) -> AppResult<ApiResponse<PaymentConfirmed>> {
    let txn = state.orm.begin().await?;
    let result = apply_confirmation(&txn, &confirmation).await;
    let confirmed = match finish(txn, result).await {
        Ok(confirmed) => confirmed,
        Err(err) => {
            tracing::warn!(
                payment_id = %confirmation.payment_id,
                status = confirmation.status.as_str(),
                error = %err,
                "payment webhook rejected"
            );
            return Err(err);
        }
    };

    tracing::info!(
        payment_id = %confirmed.payment_id,
        order_id = %confirmed.order_id,
        payment_status = confirmed.payment_status.as_str(),
        order_status = confirmed.order_status.map(OrderStatus::as_str),
        "payment confirmed"
    );
    audit::record(
        &state.pool,
        None,
        "payment_webhook",
        "payments",
        serde_json::json!({
            "payment_id": confirmed.payment_id,
            "order_id": confirmed.order_id,
            "status": confirmed.payment_status,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment status updated",
        confirmed,
        None,
    ))
}

async fn apply_confirmation<C: ConnectionTrait>(
    conn: &C,
    confirmation: &PaymentConfirmation,
) -> AppResult<PaymentConfirmed> {
    let payment = Payments::find_by_id(confirmation.payment_id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

    let verified =
        otp::verify_otp_blocking(confirmation.otp.clone(), payment.otp_hash.clone()).await?;
    if !verified {
        return Err(AppError::UnauthorizedPayment);
    }

    let next = payment.status.transition_to(confirmation.status)?;
    let order_id = payment.order_id;
    let mut active: PaymentActive = payment.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    let payment = active.update(conn).await?;

    let order_status = if next == PaymentStatus::Paid {
        Some(settle_order(conn, order_id).await?)
    } else {
        None
    };

    Ok(PaymentConfirmed {
        payment_id: payment.id,
        order_id,
        payment_status: payment.status,
        order_status,
    })
}

/// Moves the order to `paid`. A completed order has already moved past
/// payment and is left as is.
async fn settle_order<C: ConnectionTrait>(
    conn: &C,
    order_id: uuid::Uuid,
) -> AppResult<OrderStatus> {
    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    if order.status == OrderStatus::Completed {
        return Ok(order.status);
    }

    let next = order.status.transition_to(OrderStatus::Paid)?;
    if next == order.status {
        return Ok(next);
    }

    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?.status)
}
