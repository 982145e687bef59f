mod common;

use axum::{body::Body, http::{Request, StatusCode}};

#[tokio::test]
async fn health_check_reports_database_ok() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let (response, body) = common::send(
        common::app(&state),
        Request::get("/health").body(Body::empty())?,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Health check");
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "ok");
    Ok(())
}

#[tokio::test]
async fn unknown_route_returns_error_envelope() -> anyhow::Result<()> {
    let state = common::lazy_state();

    let (response, body) = common::send(
        common::app(&state),
        Request::get("/api/does-not-exist").body(Body::empty())?,
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["code"], "not_found");
    assert!(response.headers().contains_key("x-request-id"));
    Ok(())
}
