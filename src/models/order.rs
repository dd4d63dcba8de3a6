use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::ParseStatusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    PendingConfirmation,
    Paid,
    Expired,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PendingConfirmation => "PENDING_CONFIRMATION",
            OrderStatus::Paid => "PAID",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PENDING_CONFIRMATION" => Ok(OrderStatus::PendingConfirmation),
            "PAID" => Ok(OrderStatus::Paid),
            "EXPIRED" => Ok(OrderStatus::Expired),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(ParseStatusError { kind: "order", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(ParseStatusError { kind: "payment", value: other.to_string() }),
        }
    }
}

/// Who the customer says they are; only recorded when they claim payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerIdentity {
    #[serde(alias = "customerName")]
    #[validate(length(min = 1, max = 255, message = "is required"))]
    pub name: String,
    #[serde(alias = "customerEmail")]
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[serde(alias = "customerPhone")]
    #[validate(length(min = 6, max = 32, message = "must be 6 to 32 characters"))]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub event_id: i64,
    pub session_id: String,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub customer: Option<CustomerIdentity>,
    /// Only meaningful while the order is PENDING.
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub access_token_hash: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending && self.expires_at.is_some_and(|at| at < now)
    }
}

/// One seat of an order, with label and price frozen at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub order_id: Uuid,
    pub seat_id: i64,
    pub seat_number: String,
    pub section: String,
    pub row: String,
    pub category: String,
    pub price: i64,
    #[serde(skip_serializing)]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub method: String,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
}
