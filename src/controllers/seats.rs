use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{ok, AppJson, AppPath, AppQuery};
use crate::error::{ReservationError, ReservationResult};
use crate::models::requests::{AcquireLocksRequest, ExtendLocksRequest, ReleaseLocksRequest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/seats/lock", post(lock_seats))
        .route("/seats/extend-lock", post(extend_lock))
        .route("/seats/unlock", post(unlock_seats))
        .route("/seats/locks", get(session_locks))
        .route("/events/{event_id}/seats", get(seat_map))
}

// POST /api/seats/lock
async fn lock_seats(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<AcquireLocksRequest>,
) -> ReservationResult<impl IntoResponse> {
    let grant = state.locks.acquire(req).await?;
    Ok(ok(grant))
}

// POST /api/seats/extend-lock
async fn extend_lock(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ExtendLocksRequest>,
) -> ReservationResult<impl IntoResponse> {
    let extension = state.locks.extend(req).await?;
    Ok(ok(extension))
}

// POST /api/seats/unlock
//
// Page-unload beacons post the JSON body as text/plain, so the body is read
// raw and parsed regardless of content type.
async fn unlock_seats(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ReservationResult<impl IntoResponse> {
    let req: ReleaseLocksRequest = serde_json::from_slice(&body)
        .map_err(|e| ReservationError::Validation(format!("invalid unlock body: {}", e)))?;
    let released = state.locks.release(req).await?;
    Ok((StatusCode::ACCEPTED, ok(json!({ "released": released }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionLocksQuery {
    session_id: Option<String>,
    event_id: Option<i64>,
}

// GET /api/seats/locks?sessionId=..&eventId=..
async fn session_locks(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<SessionLocksQuery>,
) -> ReservationResult<impl IntoResponse> {
    let (Some(session_id), Some(event_id)) = (query.session_id, query.event_id) else {
        return Err(ReservationError::Validation(
            "sessionId and eventId are required".to_string(),
        ));
    };
    let locks = state.locks.session_locks(&session_id, event_id).await?;
    Ok(ok(locks))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeatMapQuery {
    session_id: Option<String>,
}

// GET /api/events/{event_id}/seats?sessionId=..
async fn seat_map(
    State(state): State<Arc<AppState>>,
    AppPath(event_id): AppPath<i64>,
    AppQuery(query): AppQuery<SeatMapQuery>,
) -> ReservationResult<impl IntoResponse> {
    let seats = state.locks.seat_map(event_id, query.session_id.as_deref()).await?;
    Ok(ok(seats))
}
