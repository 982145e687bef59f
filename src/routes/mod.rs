use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderName, Request, Response, StatusCode, Uri},
    routing::get,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::{
    response::{ApiResponse, ErrorBody},
    state::AppState,
};

pub mod admin;
pub mod auth;
pub mod cart;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod products;
pub mod users;
pub mod webhook;

const REQUEST_ID_HEADER: &str = "x-request-id";

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/user", users::router())
        .nest("/products", products::router())
        .nest("/categories", products::categories_router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/webhook", webhook::router())
        .nest("/admin", admin::router())
}

/// Full application: API, health, docs and the shared middleware stack.
pub fn create_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(method = %request.method(), uri = %request.uri(), "request started");
        })
        .on_response(|response: &Response<_>, latency: Duration, _span: &tracing::Span| {
            tracing::info!(
                status = %response.status(),
                ms = %latency.as_millis(),
                "request finished"
            );
        });

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", create_api_router())
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(ConcurrencyLimitLayer::new(100))
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<()>>) {
    let body = ApiResponse::error(
        "Not Found",
        ErrorBody {
            code: "not_found".into(),
            detail: format!("No route for {}", uri.path()),
        },
    );
    (StatusCode::NOT_FOUND, Json(body))
}
