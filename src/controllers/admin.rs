use axum::{
    extract::State,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{ok, parse_uuid, AppJson, AppPath, AppQuery};
use crate::error::ReservationResult;
use crate::middleware::AdminUser;
use crate::models::requests::RejectPaymentRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/seat-locks", get(list_locks))
        .route("/admin/seat-locks/clear-all", post(clear_all_locks))
        .route("/admin/seat-locks/{lock_id}", delete(delete_lock))
        .route("/admin/orders/{order_id}/confirm", post(confirm_order))
        .route("/admin/orders/{order_id}/reject", post(reject_order))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockListQuery {
    event_id: Option<i64>,
}

// GET /api/admin/seat-locks?eventId=..
async fn list_locks(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppQuery(query): AppQuery<LockListQuery>,
) -> ReservationResult<impl IntoResponse> {
    let locks = state.locks.active_locks(query.event_id).await?;
    Ok(ok(json!({ "count": locks.len(), "locks": locks })))
}

// DELETE /api/admin/seat-locks/{lock_id}
async fn delete_lock(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    AppPath(lock_id): AppPath<String>,
) -> ReservationResult<impl IntoResponse> {
    let lock_id = parse_uuid(&lock_id, "lock id")?;
    let lock = state.locks.force_release(lock_id, &admin.username).await?;
    Ok(ok(lock))
}

// POST /api/admin/seat-locks/clear-all
async fn clear_all_locks(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
) -> ReservationResult<impl IntoResponse> {
    let cleared = state.locks.clear_all(&admin.username).await?;
    Ok(ok(json!({ "cleared": cleared })))
}

// POST /api/admin/orders/{order_id}/confirm
async fn confirm_order(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    AppPath(order_id): AppPath<String>,
) -> ReservationResult<impl IntoResponse> {
    let order_id = parse_uuid(&order_id, "order id")?;
    let details = state.settlement.finalize_payment(order_id, &admin.username).await?;
    Ok(ok(details))
}

// POST /api/admin/orders/{order_id}/reject
async fn reject_order(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    AppPath(order_id): AppPath<String>,
    AppJson(req): AppJson<RejectPaymentRequest>,
) -> ReservationResult<impl IntoResponse> {
    let order_id = parse_uuid(&order_id, "order id")?;
    let details = state.settlement.reject_payment(order_id, req, &admin.username).await?;
    Ok(ok(details))
}
