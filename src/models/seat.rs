use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ParseStatusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    /// Never persisted: derived from a live lock row when building seat maps.
    Locked,
    Reserved,
    Sold,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Locked => "LOCKED",
            SeatStatus::Reserved => "RESERVED",
            SeatStatus::Sold => "SOLD",
        }
    }
}

impl FromStr for SeatStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SeatStatus::Available),
            "LOCKED" => Ok(SeatStatus::Locked),
            "RESERVED" => Ok(SeatStatus::Reserved),
            "SOLD" => Ok(SeatStatus::Sold),
            other => Err(ParseStatusError { kind: "seat", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: i64,
    pub event_id: i64,
    pub section: String,
    pub row: String,
    pub number: i32,
    /// Human label, e.g. "A12".
    pub seat_number: String,
    pub category: String,
    /// Minor currency units.
    pub price: i64,
    pub status: SeatStatus,
    pub is_disabled: bool,
}

/// A seat as the seat map shows it to one session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    #[serde(flatten)]
    pub seat: Seat,
    pub effective_status: SeatStatus,
    pub locked_by_me: bool,
    pub locked_by_other: bool,
    pub lock_expires_at: Option<DateTime<Utc>>,
}
