//! Durable state for locks, orders and payments.
//!
//! Every method on [`ReservationStore`] is one atomic unit: implementations
//! must run it inside a single transaction (or an equivalent critical
//! section) so concurrent callers claiming the same seat are serialized and
//! exactly one of them wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ReservationResult;
use crate::models::{
    ActiveLockView, CustomerIdentity, Lock, Order, OrderDetails, Seat, SessionLock,
};

pub mod memory;
pub mod postgres;
pub mod rules;

pub use memory::InMemoryReservationStore;
pub use postgres::PgReservationStore;

/// Input for [`ReservationStore::acquire_locks`].
#[derive(Debug, Clone)]
pub struct LockClaim {
    pub event_id: i64,
    pub seat_ids: Vec<i64>,
    pub session_id: String,
    pub ticket_category: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// Input for [`ReservationStore::create_pending_order`]. Identifiers and the
/// token digest are minted by the caller so a retry can mint fresh ones.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub order_number: String,
    pub event_id: i64,
    pub session_id: String,
    pub seat_ids: Vec<i64>,
    pub access_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// Input for [`ReservationStore::claim_payment`].
#[derive(Debug, Clone)]
pub struct PaymentClaim {
    pub order_number: String,
    pub access_token_hash: String,
    pub customer: CustomerIdentity,
    pub now: DateTime<Utc>,
}

/// A PENDING order whose expiry had passed when the sweep looked.
#[derive(Debug, Clone)]
pub struct ExpiredOrderRef {
    pub id: Uuid,
    pub order_number: String,
    pub event_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpireOutcome {
    Expired { event_id: i64, order_number: String, released_seat_ids: Vec<i64> },
    /// The order left PENDING (or its expiry moved) before its own transaction ran.
    Skipped,
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Lock every requested seat for the session, or none of them.
    async fn acquire_locks(&self, claim: &LockClaim) -> ReservationResult<Vec<Lock>>;

    /// Push the expiry of the session's live locks to `expires_at`.
    async fn extend_locks(
        &self,
        event_id: i64,
        seat_ids: &[i64],
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ReservationResult<u64>;

    /// Delete the session's locks on these seats. Absent rows are not an error.
    async fn release_locks(&self, seat_ids: &[i64], session_id: &str) -> ReservationResult<u64>;

    async fn session_locks(
        &self,
        session_id: &str,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> ReservationResult<Vec<SessionLock>>;

    async fn event_seats(&self, event_id: i64) -> ReservationResult<Vec<Seat>>;

    async fn event_locks(&self, event_id: i64, now: DateTime<Utc>) -> ReservationResult<Vec<Lock>>;

    /// Order + items + payment + seats RESERVED + locks deleted, atomically.
    async fn create_pending_order(&self, draft: &OrderDraft) -> ReservationResult<OrderDetails>;

    async fn find_order(&self, order_number: &str) -> ReservationResult<Option<OrderDetails>>;

    /// PENDING → PENDING_CONFIRMATION after verifying the token digest.
    async fn claim_payment(&self, claim: &PaymentClaim) -> ReservationResult<Order>;

    /// PENDING_CONFIRMATION → PAID; seats RESERVED → SOLD.
    async fn finalize_payment(&self, order_id: Uuid, now: DateTime<Utc>) -> ReservationResult<OrderDetails>;

    /// PENDING_CONFIRMATION → CANCELLED; seats back to AVAILABLE.
    async fn reject_payment(
        &self,
        order_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ReservationResult<OrderDetails>;

    async fn expired_pending_orders(&self, now: DateTime<Utc>) -> ReservationResult<Vec<ExpiredOrderRef>>;

    /// Re-checks the order inside its own transaction before expiring it.
    async fn expire_order(&self, order_id: Uuid, now: DateTime<Utc>) -> ReservationResult<ExpireOutcome>;

    async fn delete_expired_locks(&self, now: DateTime<Utc>) -> ReservationResult<u64>;

    async fn active_locks(
        &self,
        event_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> ReservationResult<Vec<ActiveLockView>>;

    async fn delete_lock(&self, lock_id: Uuid) -> ReservationResult<Option<Lock>>;

    /// Emergency reset: drops every lock row, live or not.
    async fn clear_locks(&self) -> ReservationResult<u64>;
}
