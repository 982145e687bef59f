mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use checkout_api::{
    dto::{
        orders::{CheckoutRequest, CheckoutResponse, UpdateOrderStatusRequest},
        payments::PaymentConfirmation,
    },
    entity::{OrderStatus, PaymentMethod, PaymentStatus, Orders, Payments},
    error::AppError,
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
    services::{admin_service, order_service, payment_service},
    state::AppState,
};
use sea_orm::EntityTrait;
use uuid::Uuid;

async fn place_order(state: &AppState) -> anyhow::Result<CheckoutResponse> {
    let user = common::create_user(state, ROLE_USER).await?;
    let product = common::create_product(state, 40, 10).await?;
    common::add_to_cart(state, &user, product.id, 2).await?;
    let placed = order_service::checkout(
        state,
        &user,
        CheckoutRequest {
            method: PaymentMethod::Debit,
        },
    )
    .await?
    .data
    .expect("checkout data");
    Ok(placed)
}

fn confirmation(placed: &CheckoutResponse, status: PaymentStatus, otp: &str) -> PaymentConfirmation {
    PaymentConfirmation {
        payment_id: placed.payment_id,
        status,
        otp: otp.to_string(),
    }
}

async fn statuses(state: &AppState, placed: &CheckoutResponse) -> anyhow::Result<(PaymentStatus, OrderStatus)> {
    let payment = Payments::find_by_id(placed.payment_id)
        .one(&state.orm)
        .await?
        .expect("payment row");
    let order = Orders::find_by_id(placed.order_id)
        .one(&state.orm)
        .await?
        .expect("order row");
    Ok((payment.status, order.status))
}

#[tokio::test]
async fn matching_secret_settles_payment_and_order() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let placed = place_order(&state).await?;

    let confirmed = payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Paid, &placed.otp),
    )
    .await?
    .data
    .expect("confirmation data");

    assert_eq!(confirmed.order_id, placed.order_id);
    assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
    assert_eq!(confirmed.order_status, Some(OrderStatus::Paid));
    assert_eq!(
        statuses(&state, &placed).await?,
        (PaymentStatus::Paid, OrderStatus::Paid)
    );
    Ok(())
}

#[tokio::test]
async fn wrong_secret_changes_nothing() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let placed = place_order(&state).await?;

    let err = payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Paid, "WRONG000"),
    )
    .await
    .expect_err("wrong secret must be rejected");
    assert!(matches!(err, AppError::UnauthorizedPayment));

    assert_eq!(
        statuses(&state, &placed).await?,
        (PaymentStatus::Unpaid, OrderStatus::Pending)
    );
    Ok(())
}

#[tokio::test]
async fn repeated_paid_callback_is_idempotent() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let placed = place_order(&state).await?;

    for _ in 0..2 {
        payment_service::confirm_payment(
            &state,
            confirmation(&placed, PaymentStatus::Paid, &placed.otp),
        )
        .await?;
    }

    assert_eq!(
        statuses(&state, &placed).await?,
        (PaymentStatus::Paid, OrderStatus::Paid)
    );
    Ok(())
}

#[tokio::test]
async fn unknown_payment_is_distinguished_from_bad_secret() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let placed = place_order(&state).await?;

    let missing = PaymentConfirmation {
        payment_id: Uuid::new_v4(),
        status: PaymentStatus::Paid,
        otp: placed.otp.clone(),
    };
    let not_found = payment_service::confirm_payment(&state, missing)
        .await
        .expect_err("unknown payment");
    assert!(matches!(not_found, AppError::PaymentNotFound));
    assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

    let unauthorized = payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Paid, "nope"),
    )
    .await
    .expect_err("bad secret");
    assert_eq!(unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn failed_payment_can_be_retried_but_paid_cannot_fail() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let placed = place_order(&state).await?;

    let failed = payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Failed, &placed.otp),
    )
    .await?
    .data
    .expect("confirmation data");
    assert_eq!(failed.payment_status, PaymentStatus::Failed);
    assert_eq!(failed.order_status, None);
    assert_eq!(
        statuses(&state, &placed).await?,
        (PaymentStatus::Failed, OrderStatus::Pending)
    );

    payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Paid, &placed.otp),
    )
    .await?;

    let err = payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Failed, &placed.otp),
    )
    .await
    .expect_err("paid payments cannot fail");
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(
        statuses(&state, &placed).await?,
        (PaymentStatus::Paid, OrderStatus::Paid)
    );
    Ok(())
}

#[tokio::test]
async fn canceled_order_cannot_be_paid() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, ROLE_ADMIN).await?;
    let placed = place_order(&state).await?;

    admin_service::update_order_status(
        &state,
        &admin,
        placed.order_id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Canceled,
        },
    )
    .await?;

    let err = payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Paid, &placed.otp),
    )
    .await
    .expect_err("canceled orders stay canceled");
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(
        statuses(&state, &placed).await?,
        (PaymentStatus::Unpaid, OrderStatus::Canceled)
    );
    Ok(())
}

#[tokio::test]
async fn completed_order_is_left_alone_by_repeated_callback() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, ROLE_ADMIN).await?;
    let placed = place_order(&state).await?;

    payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Paid, &placed.otp),
    )
    .await?;
    admin_service::update_order_status(
        &state,
        &admin,
        placed.order_id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Completed,
        },
    )
    .await?;

    let confirmed = payment_service::confirm_payment(
        &state,
        confirmation(&placed, PaymentStatus::Paid, &placed.otp),
    )
    .await?
    .data
    .expect("confirmation data");
    assert_eq!(confirmed.order_status, Some(OrderStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn webhook_endpoint_settles_over_http() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let placed = place_order(&state).await?;

    let uri = format!(
        "/api/webhook/payment?paymentId={}&status=paid&otp={}",
        placed.payment_id, placed.otp
    );
    let (response, body) =
        common::send(common::app(&state), Request::get(uri).body(Body::empty())?).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["payment_status"], "paid");
    assert_eq!(body["data"]["order_status"], "paid");

    let uri = format!(
        "/api/webhook/payment?paymentId={}&status=paid&otp=WRONG000",
        placed.payment_id
    );
    let (response, body) =
        common::send(common::app(&state), Request::get(uri).body(Body::empty())?).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized_payment");
    Ok(())
}
