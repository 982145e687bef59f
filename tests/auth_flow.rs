mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::json;
use uuid::Uuid;

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn register_login_and_read_profile() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let email = format!("{}@example.test", Uuid::new_v4());

    let (response, body) = common::send(
        common::app(&state),
        json_request(
            "POST",
            "/api/auth/register",
            json!({ "name": "Ada", "email": email, "password": "secret1" }),
        )?,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body["data"]["email"], email);
    assert_eq!(body["data"]["role"], "user");
    assert!(body["data"].get("password_hash").is_none());

    let (response, _) = common::send(
        common::app(&state),
        json_request(
            "POST",
            "/api/auth/register",
            json!({ "name": "Ada", "email": email, "password": "secret1" }),
        )?,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (response, body) = common::send(
        common::app(&state),
        json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": email, "password": "secret1" }),
        )?,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = body["data"]["token"].as_str().expect("token").to_string();
    assert!(token.starts_with("Bearer "));
    assert!(body["data"]["expires_at"].as_str().is_some());
    assert_eq!(body["data"]["user"]["email"], email);
    assert!(body["data"]["user"].get("password_hash").is_none());

    let (response, body) = common::send(
        common::app(&state),
        Request::get("/api/user/me")
            .header(header::AUTHORIZATION, token)
            .body(Body::empty())?,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["data"]["name"], "Ada");
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_short_password_are_rejected() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let email = format!("{}@example.test", Uuid::new_v4());

    let (response, _) = common::send(
        common::app(&state),
        json_request(
            "POST",
            "/api/auth/register",
            json!({ "name": "Bob", "email": email, "password": "12345" }),
        )?,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    common::send(
        common::app(&state),
        json_request(
            "POST",
            "/api/auth/register",
            json!({ "name": "Bob", "email": email, "password": "123456" }),
        )?,
    )
    .await;

    let (response, body) = common::send(
        common::app(&state),
        json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": email, "password": "654321" }),
        )?,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
    Ok(())
}
