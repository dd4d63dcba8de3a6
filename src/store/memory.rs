//! In-process store used by the test suite and for local experiments.
//!
//! One async mutex guards the whole state and every trait method holds it
//! for its full duration, which gives each operation serializable isolation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{rules, ExpireOutcome, ExpiredOrderRef, LockClaim, OrderDraft, PaymentClaim, ReservationStore};
use crate::error::{ReservationError, ReservationResult};
use crate::models::{
    ActiveLockView, Event, Lock, Order, OrderDetails, OrderItem, OrderStatus, Payment,
    PaymentStatus, Seat, SeatStatus, SessionLock,
};

#[derive(Default)]
struct MemoryState {
    events: HashMap<i64, Event>,
    seats: BTreeMap<i64, Seat>,
    /// Keyed by seat id, so a second holder for a seat cannot exist.
    locks: HashMap<i64, Lock>,
    orders: HashMap<Uuid, Order>,
    order_numbers: HashMap<String, Uuid>,
    items: HashMap<Uuid, Vec<OrderItem>>,
    payments: HashMap<Uuid, Payment>,
    failing_expiries: HashSet<Uuid>,
}

impl MemoryState {
    fn seats_of_event(&self, event_id: i64, seat_ids: &[i64]) -> Vec<Seat> {
        seat_ids
            .iter()
            .filter_map(|id| self.seats.get(id))
            .filter(|seat| seat.event_id == event_id)
            .cloned()
            .collect()
    }

    fn locks_for(&self, seat_ids: &[i64]) -> Vec<Lock> {
        seat_ids.iter().filter_map(|id| self.locks.get(id)).cloned().collect()
    }

    fn details(&self, order_id: Uuid) -> ReservationResult<OrderDetails> {
        let order = self
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| ReservationError::NotFound(format!("order {}", order_id)))?;
        Ok(OrderDetails {
            order,
            items: self.items.get(&order_id).cloned().unwrap_or_default(),
            payment: self.payments.get(&order_id).cloned(),
        })
    }

    fn order_mut(&mut self, order_id: Uuid) -> ReservationResult<&mut Order> {
        self.orders
            .get_mut(&order_id)
            .ok_or_else(|| ReservationError::NotFound(format!("order {}", order_id)))
    }

    fn active_seat_ids(&self, order_id: Uuid) -> Vec<i64> {
        self.items
            .get(&order_id)
            .map(|items| items.iter().filter(|i| i.active).map(|i| i.seat_id).collect())
            .unwrap_or_default()
    }

    /// Puts RESERVED seats of an order back on sale and drops stray locks.
    fn release_order_seats(&mut self, order_id: Uuid, event_id: i64) -> Vec<i64> {
        let seat_ids = self.active_seat_ids(order_id);
        if let Some(items) = self.items.get_mut(&order_id) {
            for item in items.iter_mut() {
                item.active = false;
            }
        }
        let mut released = Vec::new();
        for seat_id in &seat_ids {
            if let Some(seat) = self.seats.get_mut(seat_id) {
                if seat.status == SeatStatus::Reserved {
                    seat.status = SeatStatus::Available;
                    released.push(*seat_id);
                }
            }
            if self.locks.get(seat_id).is_some_and(|l| l.event_id == event_id) {
                self.locks.remove(seat_id);
            }
        }
        released
    }

    fn set_payment_status(&mut self, order_id: Uuid, status: PaymentStatus, now: DateTime<Utc>) {
        if let Some(payment) = self.payments.get_mut(&order_id) {
            payment.status = status;
            payment.updated_at = now;
            if status == PaymentStatus::Paid {
                payment.paid_at = Some(now);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryReservationStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        self.state.lock().await.events.insert(event.id, event);
    }

    pub async fn insert_seat(&self, seat: Seat) {
        self.state.lock().await.seats.insert(seat.id, seat);
    }

    pub async fn seat(&self, seat_id: i64) -> Option<Seat> {
        self.state.lock().await.seats.get(&seat_id).cloned()
    }

    pub async fn set_seat_price(&self, seat_id: i64, price: i64) {
        if let Some(seat) = self.state.lock().await.seats.get_mut(&seat_id) {
            seat.price = price;
        }
    }

    /// Every lock row, live or expired, ordered by seat id.
    pub async fn all_locks(&self) -> Vec<Lock> {
        let state = self.state.lock().await;
        let mut locks: Vec<Lock> = state.locks.values().cloned().collect();
        locks.sort_by_key(|l| l.seat_id);
        locks
    }

    pub async fn order(&self, order_id: Uuid) -> Option<OrderDetails> {
        self.state.lock().await.details(order_id).ok()
    }

    /// Makes the next sweeps fail for this order until cleared.
    pub async fn fail_expiry_of(&self, order_id: Uuid) {
        self.state.lock().await.failing_expiries.insert(order_id);
    }

    pub async fn clear_expiry_failures(&self) {
        self.state.lock().await.failing_expiries.clear();
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn acquire_locks(&self, claim: &LockClaim) -> ReservationResult<Vec<Lock>> {
        let mut state = self.state.lock().await;

        rules::ensure_event_bookable(claim.event_id, state.events.get(&claim.event_id))?;
        let seats = state.seats_of_event(claim.event_id, &claim.seat_ids);
        rules::ensure_seats_found(&claim.seat_ids, &seats)?;
        let existing = state.locks_for(&claim.seat_ids);
        rules::ensure_claimable(&seats, &existing, &claim.session_id, claim.now)?;

        let mut granted = Vec::with_capacity(claim.seat_ids.len());
        for seat_id in &claim.seat_ids {
            let lock = match state.locks.get(seat_id) {
                // Same session refreshes in place instead of duplicating.
                Some(current) if current.is_held_by(&claim.session_id) => Lock {
                    ticket_category: claim.ticket_category.clone(),
                    expires_at: claim.expires_at,
                    ..current.clone()
                },
                _ => Lock {
                    id: Uuid::new_v4(),
                    seat_id: *seat_id,
                    event_id: claim.event_id,
                    session_id: claim.session_id.clone(),
                    ticket_category: claim.ticket_category.clone(),
                    expires_at: claim.expires_at,
                    created_at: claim.now,
                },
            };
            state.locks.insert(*seat_id, lock.clone());
            granted.push(lock);
        }
        Ok(granted)
    }

    async fn extend_locks(
        &self,
        event_id: i64,
        seat_ids: &[i64],
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ReservationResult<u64> {
        let mut state = self.state.lock().await;

        let locks: Vec<Lock> = state
            .locks_for(seat_ids)
            .into_iter()
            .filter(|l| l.event_id == event_id)
            .collect();
        rules::ensure_extendable(seat_ids, &locks, session_id, now)?;

        let mut extended = 0;
        for seat_id in seat_ids {
            if let Some(lock) = state.locks.get_mut(seat_id) {
                lock.expires_at = expires_at;
                extended += 1;
            }
        }
        Ok(extended)
    }

    async fn release_locks(&self, seat_ids: &[i64], session_id: &str) -> ReservationResult<u64> {
        let mut state = self.state.lock().await;
        let mut released = 0;
        for seat_id in seat_ids {
            if state.locks.get(seat_id).is_some_and(|l| l.is_held_by(session_id)) {
                state.locks.remove(seat_id);
                released += 1;
            }
        }
        Ok(released)
    }

    async fn session_locks(
        &self,
        session_id: &str,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> ReservationResult<Vec<SessionLock>> {
        let state = self.state.lock().await;
        let mut locks: Vec<SessionLock> = state
            .locks
            .values()
            .filter(|l| l.is_held_by(session_id) && l.event_id == event_id && l.is_active(now))
            .filter_map(|l| {
                state.seats.get(&l.seat_id).map(|seat| SessionLock {
                    seat_id: seat.id,
                    seat_number: seat.seat_number.clone(),
                    section: seat.section.clone(),
                    row: seat.row.clone(),
                    number: seat.number,
                    category: seat.category.clone(),
                    price: seat.price,
                    ticket_category: l.ticket_category.clone(),
                    expires_at: l.expires_at,
                })
            })
            .collect();
        locks.sort_by_key(|l| l.seat_id);
        Ok(locks)
    }

    async fn event_seats(&self, event_id: i64) -> ReservationResult<Vec<Seat>> {
        let state = self.state.lock().await;
        if !state.events.contains_key(&event_id) {
            return Err(ReservationError::NotFound(format!("event {}", event_id)));
        }
        Ok(state.seats.values().filter(|s| s.event_id == event_id).cloned().collect())
    }

    async fn event_locks(&self, event_id: i64, now: DateTime<Utc>) -> ReservationResult<Vec<Lock>> {
        let state = self.state.lock().await;
        Ok(state
            .locks
            .values()
            .filter(|l| l.event_id == event_id && l.is_active(now))
            .cloned()
            .collect())
    }

    async fn create_pending_order(&self, draft: &OrderDraft) -> ReservationResult<OrderDetails> {
        let mut state = self.state.lock().await;

        rules::ensure_event_bookable(draft.event_id, state.events.get(&draft.event_id))?;
        let seats = state.seats_of_event(draft.event_id, &draft.seat_ids);
        rules::ensure_seats_found(&draft.seat_ids, &seats)?;
        let locks = state.locks_for(&draft.seat_ids);
        rules::ensure_claimable(&seats, &locks, &draft.session_id, draft.now)?;
        if state.order_numbers.contains_key(&draft.order_number) {
            return Err(ReservationError::ConflictAborted);
        }

        let total_amount = rules::order_total(&seats)?;
        let order = Order {
            id: draft.order_id,
            order_number: draft.order_number.clone(),
            event_id: draft.event_id,
            session_id: draft.session_id.clone(),
            total_amount,
            status: OrderStatus::Pending,
            customer: None,
            expires_at: Some(draft.expires_at),
            access_token_hash: draft.access_token_hash.clone(),
            paid_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: draft.now,
            updated_at: draft.now,
        };
        let items: Vec<OrderItem> = seats
            .iter()
            .map(|seat| OrderItem {
                order_id: draft.order_id,
                seat_id: seat.id,
                seat_number: seat.seat_number.clone(),
                section: seat.section.clone(),
                row: seat.row.clone(),
                category: seat.category.clone(),
                price: seat.price,
                active: true,
            })
            .collect();
        let payment = Payment {
            id: draft.payment_id,
            order_id: draft.order_id,
            amount: total_amount,
            method: "BANK_TRANSFER".to_string(),
            status: PaymentStatus::Pending,
            paid_at: None,
            created_at: draft.now,
            updated_at: draft.now,
        };

        for seat in &seats {
            if let Some(stored) = state.seats.get_mut(&seat.id) {
                stored.status = SeatStatus::Reserved;
            }
            state.locks.remove(&seat.id);
        }
        state.order_numbers.insert(order.order_number.clone(), order.id);
        state.orders.insert(order.id, order);
        state.items.insert(draft.order_id, items);
        state.payments.insert(draft.order_id, payment);

        state.details(draft.order_id)
    }

    async fn find_order(&self, order_number: &str) -> ReservationResult<Option<OrderDetails>> {
        let state = self.state.lock().await;
        match state.order_numbers.get(order_number) {
            Some(id) => state.details(*id).map(Some),
            None => Ok(None),
        }
    }

    async fn claim_payment(&self, claim: &PaymentClaim) -> ReservationResult<Order> {
        let mut state = self.state.lock().await;

        let order_id = *state
            .order_numbers
            .get(&claim.order_number)
            .ok_or_else(|| ReservationError::NotFound(format!("order {}", claim.order_number)))?;
        let order = state.order_mut(order_id)?;
        rules::ensure_claimable_order(order, &claim.access_token_hash, claim.now)?;

        order.status = OrderStatus::PendingConfirmation;
        order.customer = Some(claim.customer.clone());
        order.expires_at = None;
        order.updated_at = claim.now;
        Ok(order.clone())
    }

    async fn finalize_payment(&self, order_id: Uuid, now: DateTime<Utc>) -> ReservationResult<OrderDetails> {
        let mut state = self.state.lock().await;

        let order = state.order_mut(order_id)?;
        rules::ensure_awaiting_confirmation(order)?;
        order.status = OrderStatus::Paid;
        order.paid_at = Some(now);
        order.updated_at = now;

        state.set_payment_status(order_id, PaymentStatus::Paid, now);
        for seat_id in state.active_seat_ids(order_id) {
            if let Some(seat) = state.seats.get_mut(&seat_id) {
                seat.status = SeatStatus::Sold;
            }
        }
        state.details(order_id)
    }

    async fn reject_payment(
        &self,
        order_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ReservationResult<OrderDetails> {
        let mut state = self.state.lock().await;

        let order = state.order_mut(order_id)?;
        rules::ensure_awaiting_confirmation(order)?;
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(now);
        order.cancellation_reason = Some(reason.to_string());
        order.updated_at = now;
        let event_id = order.event_id;

        state.set_payment_status(order_id, PaymentStatus::Failed, now);
        state.release_order_seats(order_id, event_id);
        state.details(order_id)
    }

    async fn expired_pending_orders(&self, now: DateTime<Utc>) -> ReservationResult<Vec<ExpiredOrderRef>> {
        let state = self.state.lock().await;
        let mut expired: Vec<ExpiredOrderRef> = state
            .orders
            .values()
            .filter(|o| o.is_past_expiry(now))
            .map(|o| ExpiredOrderRef {
                id: o.id,
                order_number: o.order_number.clone(),
                event_id: o.event_id,
                expires_at: o.expires_at,
            })
            .collect();
        expired.sort_by_key(|o| o.expires_at);
        Ok(expired)
    }

    async fn expire_order(&self, order_id: Uuid, now: DateTime<Utc>) -> ReservationResult<ExpireOutcome> {
        let mut state = self.state.lock().await;

        if state.failing_expiries.contains(&order_id) {
            return Err(ReservationError::Internal(format!("injected expiry failure for {}", order_id)));
        }

        let order = state.order_mut(order_id)?;
        if !order.is_past_expiry(now) {
            return Ok(ExpireOutcome::Skipped);
        }
        order.status = OrderStatus::Expired;
        order.updated_at = now;
        let event_id = order.event_id;
        let order_number = order.order_number.clone();

        state.set_payment_status(order_id, PaymentStatus::Failed, now);
        let released_seat_ids = state.release_order_seats(order_id, event_id);
        Ok(ExpireOutcome::Expired { event_id, order_number, released_seat_ids })
    }

    async fn delete_expired_locks(&self, now: DateTime<Utc>) -> ReservationResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.locks.len();
        state.locks.retain(|_, lock| lock.is_active(now));
        Ok((before - state.locks.len()) as u64)
    }

    async fn active_locks(
        &self,
        event_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> ReservationResult<Vec<ActiveLockView>> {
        let state = self.state.lock().await;
        let mut views: Vec<ActiveLockView> = state
            .locks
            .values()
            .filter(|l| l.is_active(now) && event_id.map_or(true, |id| l.event_id == id))
            .filter_map(|l| {
                let seat = state.seats.get(&l.seat_id)?;
                let event = state.events.get(&l.event_id)?;
                Some(ActiveLockView {
                    id: l.id,
                    seat_id: l.seat_id,
                    seat_number: seat.seat_number.clone(),
                    section: seat.section.clone(),
                    row: seat.row.clone(),
                    event_id: l.event_id,
                    event_name: event.name.clone(),
                    session_id: l.session_id.clone(),
                    expires_at: l.expires_at,
                    created_at: l.created_at,
                    time_remaining_secs: (l.expires_at - now).num_seconds().max(0),
                })
            })
            .collect();
        views.sort_by_key(|v| v.expires_at);
        Ok(views)
    }

    async fn delete_lock(&self, lock_id: Uuid) -> ReservationResult<Option<Lock>> {
        let mut state = self.state.lock().await;
        let seat_id = state.locks.values().find(|l| l.id == lock_id).map(|l| l.seat_id);
        Ok(seat_id.and_then(|id| state.locks.remove(&id)))
    }

    async fn clear_locks(&self) -> ReservationResult<u64> {
        let mut state = self.state.lock().await;
        let cleared = state.locks.len() as u64;
        state.locks.clear();
        Ok(cleared)
    }
}
