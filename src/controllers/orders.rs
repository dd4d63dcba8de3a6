use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::{ok, AppJson, AppPath};
use crate::error::ReservationResult;
use crate::models::requests::{ConfirmPaymentRequest, CreatePendingOrderRequest};
use crate::AppState;

pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/create-pending", post(create_pending))
        .route("/orders/confirm-payment", post(confirm_payment))
        .route("/orders/{order_number}", get(get_order))
}

// POST /api/orders/create-pending
async fn create_pending(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreatePendingOrderRequest>,
) -> ReservationResult<impl IntoResponse> {
    let order = state.orders.create_pending_order(req).await?;
    Ok((StatusCode::CREATED, ok(order)))
}

// POST /api/orders/confirm-payment
async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ConfirmPaymentRequest>,
) -> ReservationResult<impl IntoResponse> {
    let receipt = state.settlement.confirm_payment(req).await?;
    Ok(ok(receipt))
}

// GET /api/orders/{order_number}  (X-Access-Token header)
async fn get_order(
    State(state): State<Arc<AppState>>,
    AppPath(order_number): AppPath<String>,
    headers: HeaderMap,
) -> ReservationResult<impl IntoResponse> {
    let token = headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let details = state.settlement.get_order(&order_number, token).await?;
    Ok(ok(details))
}
