pub mod admin;
pub mod cron;
pub mod orders;
pub mod seats;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::error::ReservationError;
use crate::AppState;

/// Everything mounted under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(seats::routes())
        .merge(orders::routes())
        .merge(admin::routes())
}

#[derive(Debug, Serialize)]
pub struct ApiSuccess<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiSuccess<T>> {
    Json(ApiSuccess { success: true, data })
}

/// `Json<T>` whose rejections use the error envelope instead of plain text.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ReservationError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ReservationError::Validation(rejection.body_text()))?;
        Ok(AppJson(value))
    }
}

/// `Path<T>` with enveloped rejections.
pub struct AppPath<T>(pub T);

impl<S, T> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ReservationError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ReservationError::Validation(rejection.body_text()))?;
        Ok(AppPath(value))
    }
}

/// `Query<T>` with enveloped rejections.
pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ReservationError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ReservationError::Validation(rejection.body_text()))?;
        Ok(AppQuery(value))
    }
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<uuid::Uuid, ReservationError> {
    uuid::Uuid::parse_str(raw).map_err(|_| ReservationError::Validation(format!("{} must be a UUID", what)))
}
