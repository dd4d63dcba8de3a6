use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One session's temporary claim on one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub id: Uuid,
    pub seat_id: i64,
    pub event_id: i64,
    pub session_id: String,
    pub ticket_category: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Lock {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_held_by(&self, session_id: &str) -> bool {
        self.session_id == session_id
    }
}

/// A lock joined with the seat it holds, for resuming a selection after reload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLock {
    pub seat_id: i64,
    pub seat_number: String,
    pub section: String,
    pub row: String,
    pub number: i32,
    pub category: String,
    pub price: i64,
    pub ticket_category: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLockView {
    pub id: Uuid,
    pub seat_id: i64,
    pub seat_number: String,
    pub section: String,
    pub row: String,
    pub event_id: i64,
    pub event_name: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub time_remaining_secs: i64,
}
