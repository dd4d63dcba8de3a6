use axum::{extract::State, response::IntoResponse, routing::get, Router};
use serde_json::json;
use std::sync::Arc;

use super::ok;
use crate::error::ReservationResult;
use crate::middleware::CronAuth;
use crate::AppState;

/// Mounted under `/cron`. GET and POST both work so any scheduler can call them.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/expire-orders", get(expire_orders).post(expire_orders))
        .route("/cleanup-locks", get(cleanup_locks).post(cleanup_locks))
}

async fn expire_orders(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
) -> ReservationResult<impl IntoResponse> {
    let summary = state.sweeper.expire_orders().await?;
    Ok(ok(summary))
}

async fn cleanup_locks(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
) -> ReservationResult<impl IntoResponse> {
    let deleted = state.sweeper.cleanup_expired_locks().await?;
    Ok(ok(json!({ "deletedCount": deleted })))
}
