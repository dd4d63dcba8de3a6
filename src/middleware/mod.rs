use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tracing::warn;

use crate::error::ReservationError;
use crate::AppState;

/// Administrator authenticated with HTTP Basic credentials.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub username: String,
}

fn authorization<'a>(parts: &'a Parts) -> Option<&'a str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

// Basic auth against the configured username and bcrypt hash
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ReservationError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let (Some(expected_user), Some(password_hash)) =
            (&state.config.admin.username, &state.config.admin.password_hash)
        else {
            warn!("admin route hit but no admin credentials are configured");
            return Err(ReservationError::Unauthorized);
        };

        let encoded = authorization(parts)
            .and_then(|h| h.strip_prefix("Basic "))
            .ok_or(ReservationError::Unauthorized)?;

        let decoded = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| ReservationError::Unauthorized)?;
        let credentials = String::from_utf8(decoded).map_err(|_| ReservationError::Unauthorized)?;

        let (username, password) = credentials
            .split_once(':')
            .ok_or(ReservationError::Unauthorized)?;

        if !constant_time_eq::constant_time_eq(username.as_bytes(), expected_user.as_bytes()) {
            return Err(ReservationError::Unauthorized);
        }

        // bcrypt is deliberately slow; keep it off the async workers
        let password = password.to_string();
        let password_hash = password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash))
            .await
            .map_err(|e| ReservationError::Internal(e.to_string()))?
            .unwrap_or(false);

        if !valid {
            warn!(username, "admin authentication failed");
            return Err(ReservationError::Unauthorized);
        }

        Ok(AdminUser { username: username.to_string() })
    }
}

/// Scheduler presenting `Authorization: Bearer <CRON_SECRET>`.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = ReservationError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        // No secret configured means nobody may trigger the sweeper over HTTP.
        let secret = state.config.cron.secret.as_deref().ok_or(ReservationError::Unauthorized)?;

        let supplied = authorization(parts)
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(ReservationError::Unauthorized)?;

        if constant_time_eq::constant_time_eq(supplied.trim().as_bytes(), secret.as_bytes()) {
            Ok(CronAuth)
        } else {
            warn!("cron request with an invalid secret");
            Err(ReservationError::Unauthorized)
        }
    }
}
