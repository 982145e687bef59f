use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    routing::get,
};

use crate::{
    dto::payments::{PaymentConfirmation, PaymentConfirmed, PaymentWebhookQuery},
    error::{AppError, AppResult},
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/payment", get(payment_webhook))
}

/// Callback from the payment gateway. Authenticated by the one-time secret,
/// not by a bearer token.
#[utoipa::path(
    get,
    path = "/api/webhook/payment",
    params(PaymentWebhookQuery),
    responses(
        (status = 200, description = "Payment status applied", body = ApiResponse<PaymentConfirmed>),
        (status = 400, description = "Malformed payment id, status or otp"),
        (status = 401, description = "Secret does not match"),
        (status = 404, description = "Payment or order not found"),
        (status = 409, description = "Status transition not allowed"),
    ),
    tag = "Webhook"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    query: Result<Query<PaymentWebhookQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<PaymentConfirmed>>> {
    let Query(query) = query.map_err(AppError::from)?;
    let confirmation = PaymentConfirmation::try_from(query)?;
    Ok(Json(
        payment_service::confirm_payment(&state, confirmation).await?,
    ))
}
