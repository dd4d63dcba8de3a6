//! Request shapes accepted by the reservation core.
//!
//! They are deserialized straight from JSON bodies and validated before any
//! storage access, so malformed input never reaches a transaction.

use serde::Deserialize;
use validator::Validate;

use super::CustomerIdentity;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AcquireLocksRequest {
    #[validate(range(min = 1, message = "must be positive"))]
    pub event_id: i64,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub seat_ids: Vec<i64>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub session_id: String,
    #[validate(length(max = 64, message = "must be at most 64 characters"))]
    pub ticket_category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtendLocksRequest {
    #[validate(range(min = 1, message = "must be positive"))]
    pub event_id: i64,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub seat_ids: Vec<i64>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseLocksRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub seat_ids: Vec<i64>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePendingOrderRequest {
    #[validate(range(min = 1, message = "must be positive"))]
    pub event_id: i64,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub seat_ids: Vec<i64>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1, max = 32, message = "is required"))]
    pub order_number: String,
    #[validate(length(min = 1, max = 128, message = "is required"))]
    pub access_token: String,
    #[validate(nested)]
    #[serde(flatten)]
    pub customer: CustomerIdentity,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectPaymentRequest {
    #[validate(length(min = 1, max = 500, message = "is required"))]
    pub reason: String,
}
