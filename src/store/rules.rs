//! Transition rules shared by every store implementation.
//!
//! Stores load the rows under their own isolation, call these checks, and
//! only then write. Nothing in here touches storage.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::error::{ReservationError, ReservationResult};
use crate::models::{Event, Lock, Order, OrderStatus, Seat, SeatStatus};
use crate::token;

pub fn ensure_event_bookable(event_id: i64, event: Option<&Event>) -> ReservationResult<()> {
    match event {
        None => Err(ReservationError::NotFound(format!("event {}", event_id))),
        Some(event) if !event.is_bookable() => Err(ReservationError::Validation(format!(
            "event {} is not open for booking",
            event_id
        ))),
        Some(_) => Ok(()),
    }
}

/// Every requested id must be among the loaded seats of the event.
pub fn ensure_seats_found(requested: &[i64], found: &[Seat]) -> ReservationResult<()> {
    let found_ids: HashSet<i64> = found.iter().map(|s| s.id).collect();
    let mut missing: Vec<i64> = requested
        .iter()
        .copied()
        .filter(|id| !found_ids.contains(id))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    missing.dedup();
    Err(ReservationError::NotFound(format!(
        "seats {}",
        missing.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
    )))
}

/// A seat can be claimed by `session_id` when it is persisted AVAILABLE, not
/// disabled, and carries no live lock of another session.
///
/// Used both for acquiring locks and for turning seats into an order.
pub fn ensure_claimable(
    seats: &[Seat],
    locks: &[Lock],
    session_id: &str,
    now: DateTime<Utc>,
) -> ReservationResult<()> {
    let locks_by_seat: HashMap<i64, &Lock> = locks.iter().map(|l| (l.seat_id, l)).collect();

    let mut unavailable: Vec<i64> = seats
        .iter()
        .filter(|seat| {
            let held_by_other = locks_by_seat
                .get(&seat.id)
                .is_some_and(|lock| lock.is_active(now) && !lock.is_held_by(session_id));
            seat.status != SeatStatus::Available || seat.is_disabled || held_by_other
        })
        .map(|seat| seat.id)
        .collect();

    if unavailable.is_empty() {
        Ok(())
    } else {
        unavailable.sort_unstable();
        Err(ReservationError::SeatUnavailable(unavailable))
    }
}

/// Every requested seat must carry a live lock held by `session_id`.
pub fn ensure_extendable(
    seat_ids: &[i64],
    locks: &[Lock],
    session_id: &str,
    now: DateTime<Utc>,
) -> ReservationResult<()> {
    let locks_by_seat: HashMap<i64, &Lock> = locks.iter().map(|l| (l.seat_id, l)).collect();

    let mut not_locked = Vec::new();
    let mut locked_by_other = Vec::new();
    for seat_id in seat_ids {
        match locks_by_seat.get(seat_id) {
            Some(lock) if lock.is_active(now) => {
                if !lock.is_held_by(session_id) {
                    locked_by_other.push(*seat_id);
                }
            }
            _ => not_locked.push(*seat_id),
        }
    }

    if !not_locked.is_empty() {
        not_locked.sort_unstable();
        return Err(ReservationError::NotLocked(not_locked));
    }
    if !locked_by_other.is_empty() {
        locked_by_other.sort_unstable();
        return Err(ReservationError::LockedByOther(locked_by_other));
    }
    Ok(())
}

/// Token first, so a caller without the credential learns nothing about the
/// order's state.
pub fn ensure_claimable_order(
    order: &Order,
    supplied_hash: &str,
    now: DateTime<Utc>,
) -> ReservationResult<()> {
    if !token::hashes_match(&order.access_token_hash, supplied_hash) {
        return Err(ReservationError::Unauthorized);
    }

    match order.status {
        OrderStatus::Pending if order.is_past_expiry(now) => {
            Err(ReservationError::Expired(format!("order {}", order.order_number)))
        }
        OrderStatus::Pending => Ok(()),
        OrderStatus::Expired => Err(ReservationError::Expired(format!("order {}", order.order_number))),
        OrderStatus::PendingConfirmation => Err(ReservationError::InvalidState(
            "payment for this order is already awaiting confirmation".to_string(),
        )),
        OrderStatus::Paid => Err(ReservationError::InvalidState(
            "this order has already been paid".to_string(),
        )),
        OrderStatus::Cancelled => Err(ReservationError::InvalidState(
            "this order has been cancelled".to_string(),
        )),
    }
}

/// Administrative finalize and reject both start from PENDING_CONFIRMATION.
pub fn ensure_awaiting_confirmation(order: &Order) -> ReservationResult<()> {
    if order.status == OrderStatus::PendingConfirmation {
        Ok(())
    } else {
        Err(ReservationError::InvalidState(format!(
            "order {} is {}, expected PENDING_CONFIRMATION",
            order.order_number,
            order.status.as_str()
        )))
    }
}

pub fn order_total(seats: &[Seat]) -> ReservationResult<i64> {
    seats
        .iter()
        .try_fold(0i64, |total, seat| total.checked_add(seat.price))
        .ok_or_else(|| ReservationError::Internal("order total overflow".to_string()))
}
