mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use checkout_api::{
    dto::orders::CheckoutRequest,
    entity::{
        OrderStatus, PaymentMethod, PaymentStatus,
        audit_logs::{Column as AuditCol, Entity as AuditLogs},
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{Column as CartCol, Entity as Carts},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders},
        payments::Entity as Payments,
    },
    error::AppError,
    middleware::auth::ROLE_USER,
    otp::{OTP_LENGTH, verify_otp},
    routes::params::Pagination,
    services::{cart_service, order_service},
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

fn cc() -> CheckoutRequest {
    CheckoutRequest {
        method: PaymentMethod::Cc,
    }
}

#[tokio::test]
async fn checkout_reserves_stock_and_snapshots_prices() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, ROLE_USER).await?;
    let a = common::create_product(&state, 10, 5).await?;
    let b = common::create_product(&state, 5, 4).await?;

    common::add_to_cart(&state, &user, a.id, 2).await?;
    common::add_to_cart(&state, &user, b.id, 1).await?;

    let resp = order_service::checkout(&state, &user, cc()).await?;
    let placed = resp.data.expect("checkout data");

    assert_eq!(placed.total_amount, 25);
    assert_eq!(placed.otp.len(), OTP_LENGTH);
    assert!(placed.otp.chars().all(|c| c.is_ascii_alphanumeric()));

    assert_eq!(common::stock_of(&state, a.id).await?, 3);
    assert_eq!(common::stock_of(&state, b.id).await?, 3);

    let order = Orders::find_by_id(placed.order_id)
        .one(&state.orm)
        .await?
        .expect("order row");
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.user_id, user.user_id);
    assert_eq!(order.total_amount, 25);

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?;
    assert_eq!(items.len(), 2);
    let line_sum: i64 = items
        .iter()
        .map(|i| i.price_at_purchase * i64::from(i.quantity))
        .sum();
    assert_eq!(line_sum, 25);
    let item_a = items
        .iter()
        .find(|i| i.product_id == Some(a.id))
        .expect("line for product a");
    assert_eq!((item_a.price_at_purchase, item_a.quantity), (10, 2));

    let payment = Payments::find_by_id(placed.payment_id)
        .one(&state.orm)
        .await?
        .expect("payment row");
    assert_eq!(payment.order_id, order.id);
    assert_eq!(payment.status, PaymentStatus::Unpaid);
    assert_eq!(payment.amount, 25);
    assert_eq!(payment.method, PaymentMethod::Cc);
    assert_ne!(payment.otp_hash, placed.otp);
    assert!(verify_otp(&placed.otp, &payment.otp_hash)?);

    // The cart row survives, empty and with a zero total.
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .expect("cart row");
    assert_eq!(cart.total_amount, 0);
    let remaining = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .count(&state.orm)
        .await?;
    assert_eq!(remaining, 0);

    let audited = AuditLogs::find()
        .filter(AuditCol::UserId.eq(user.user_id))
        .filter(AuditCol::Action.eq("checkout"))
        .one(&state.orm)
        .await?
        .expect("checkout audit entry");
    assert_eq!(audited.resource.as_deref(), Some("orders"));
    assert_eq!(
        audited.metadata.expect("metadata")["order_id"],
        placed.order_id.to_string()
    );
    Ok(())
}

#[tokio::test]
async fn insufficient_stock_rolls_everything_back() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, ROLE_USER).await?;
    let product = common::create_product(&state, 7, 5).await?;
    common::add_to_cart(&state, &user, product.id, 5).await?;

    // Stock drops after the item went into the cart.
    sqlx::query("UPDATE products SET stock = 3 WHERE id = $1")
        .bind(product.id)
        .execute(&state.pool)
        .await?;

    let err = order_service::checkout(&state, &user, cc())
        .await
        .expect_err("checkout must fail");
    match err {
        AppError::InsufficientStock(name) => assert_eq!(name, product.name),
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(common::stock_of(&state, product.id).await?, 3);
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(orders, 0);

    let cart = cart_service::get_cart(&state, &user, Pagination::default())
        .await?
        .data
        .expect("cart view");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);
    Ok(())
}

#[tokio::test]
async fn empty_cart_is_rejected() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, ROLE_USER).await?;

    // Viewing the cart creates it lazily.
    cart_service::get_cart(&state, &user, Pagination::default()).await?;

    let err = order_service::checkout(&state, &user, cc())
        .await
        .expect_err("checkout must fail");
    assert!(matches!(err, AppError::EmptyCart));
    Ok(())
}

#[tokio::test]
async fn checkout_without_a_cart_is_not_found() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, ROLE_USER).await?;

    let err = order_service::checkout(&state, &user, cc())
        .await
        .expect_err("checkout must fail");
    assert!(matches!(err, AppError::CartNotFound));
    Ok(())
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let product = common::create_product(&state, 50, 1).await?;
    let first = common::create_user(&state, ROLE_USER).await?;
    let second = common::create_user(&state, ROLE_USER).await?;
    common::add_to_cart(&state, &first, product.id, 1).await?;
    common::add_to_cart(&state, &second, product.id, 1).await?;

    let (a, b) = tokio::join!(
        order_service::checkout(&state, &first, cc()),
        order_service::checkout(&state, &second, cc()),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let failure = a.err().or(b.err()).expect("one checkout fails");
    assert!(matches!(failure, AppError::InsufficientStock(_)));
    assert_eq!(common::stock_of(&state, product.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn orders_are_listed_and_fetched_for_their_owner_only() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let owner = common::create_user(&state, ROLE_USER).await?;
    let stranger = common::create_user(&state, ROLE_USER).await?;
    let product = common::create_product(&state, 30, 10).await?;
    common::add_to_cart(&state, &owner, product.id, 3).await?;

    let placed = order_service::checkout(&state, &owner, cc())
        .await?
        .data
        .expect("checkout data");

    let detail = order_service::get_order(&state, &owner, placed.order_id)
        .await?
        .data
        .expect("order detail");
    assert_eq!(detail.order.total_amount, 90);
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.payments.len(), 1);
    assert_eq!(detail.payments[0].id, placed.payment_id);

    let err = order_service::get_order(&state, &stranger, placed.order_id)
        .await
        .expect_err("other users cannot see the order");
    assert!(matches!(err, AppError::NotFound(_)));

    let listed = order_service::list_orders(
        &state,
        &owner,
        serde_json::from_value(serde_json::json!({ "status": "pending" }))?,
    )
    .await?;
    assert_eq!(listed.meta.and_then(|m| m.total), Some(1));
    assert_eq!(listed.data.expect("orders").items[0].id, placed.order_id);
    Ok(())
}

fn checkout_request(bearer: &str) -> anyhow::Result<Request<Body>> {
    Ok(Request::post("/api/orders/checkout")
        .header(header::AUTHORIZATION, bearer)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"method":"cc"}"#))?)
}

#[tokio::test]
async fn checkout_endpoint_returns_ok_envelope() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, ROLE_USER).await?;
    let product = common::create_product(&state, 10, 5).await?;
    common::add_to_cart(&state, &user, product.id, 2).await?;

    let (response, body) =
        common::send(common::app(&state), checkout_request(&common::bearer(&user))?).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Checkout successful");
    assert_eq!(body["data"]["total_amount"], 20);
    assert_eq!(
        body["data"]["otp"].as_str().map(str::len),
        Some(OTP_LENGTH)
    );
    assert!(body["data"]["order_id"].as_str().is_some());
    assert!(body["data"]["payment_id"].as_str().is_some());
    assert_eq!(common::stock_of(&state, product.id).await?, 3);
    Ok(())
}

#[tokio::test]
async fn checkout_endpoint_reports_missing_cart_and_short_stock() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let no_cart = common::create_user(&state, ROLE_USER).await?;
    let (response, body) =
        common::send(common::app(&state), checkout_request(&common::bearer(&no_cart))?).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["code"], "cart_not_found");

    let user = common::create_user(&state, ROLE_USER).await?;
    let product = common::create_product(&state, 10, 3).await?;
    common::add_to_cart(&state, &user, product.id, 2).await?;
    sqlx::query("UPDATE products SET stock = 1 WHERE id = $1")
        .bind(product.id)
        .execute(&state.pool)
        .await?;

    let (response, body) =
        common::send(common::app(&state), checkout_request(&common::bearer(&user))?).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["code"], "insufficient_stock");
    assert_eq!(common::stock_of(&state, product.id).await?, 1);

    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(orders, 0);
    Ok(())
}
