//! Postgres-backed store.
//!
//! Each operation opens one transaction. Seat rows are claimed with
//! `SELECT ... FOR UPDATE` in ascending id order, so two requests racing for
//! an overlapping seat set queue behind each other instead of deadlocking,
//! and the loser re-reads the winner's committed state. The unique key on
//! `seat_locks.seat_id` and the partial unique index on live order lines
//! back this up at the schema level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{rules, ExpireOutcome, ExpiredOrderRef, LockClaim, OrderDraft, PaymentClaim, ReservationStore};
use crate::database::Database;
use crate::error::{ReservationError, ReservationResult};
use crate::models::{
    ActiveLockView, CustomerIdentity, Event, Lock, Order, OrderDetails, OrderItem, Payment, Seat,
    SessionLock,
};

const SEAT_COLUMNS: &str =
    "id, event_id, section, row_label, number, seat_number, category, price, status, is_disabled";
const LOCK_COLUMNS: &str = "id, seat_id, event_id, session_id, ticket_category, expires_at, created_at";
const ORDER_COLUMNS: &str = "id, order_number, event_id, session_id, total_amount, status, \
     customer_name, customer_email, customer_phone, expires_at, access_token_hash, paid_at, \
     cancelled_at, cancellation_reason, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "order_id, seat_id, seat_number, section, row_label, category, price, active";
const PAYMENT_COLUMNS: &str =
    "id, order_id, amount, method, status, paid_at, created_at, updated_at";

#[derive(FromRow)]
struct EventRow {
    id: i64,
    name: String,
    status: String,
    starts_at: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for Event {
    type Error = ReservationError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            name: row.name,
            status: row.status.parse().map_err(corrupt)?,
            starts_at: row.starts_at,
        })
    }
}

#[derive(FromRow)]
struct SeatRow {
    id: i64,
    event_id: i64,
    section: String,
    row_label: String,
    number: i32,
    seat_number: String,
    category: String,
    price: i64,
    status: String,
    is_disabled: bool,
}

impl TryFrom<SeatRow> for Seat {
    type Error = ReservationError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            event_id: row.event_id,
            section: row.section,
            row: row.row_label,
            number: row.number,
            seat_number: row.seat_number,
            category: row.category,
            price: row.price,
            status: row.status.parse().map_err(corrupt)?,
            is_disabled: row.is_disabled,
        })
    }
}

#[derive(FromRow)]
struct LockRow {
    id: Uuid,
    seat_id: i64,
    event_id: i64,
    session_id: String,
    ticket_category: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<LockRow> for Lock {
    fn from(row: LockRow) -> Self {
        Lock {
            id: row.id,
            seat_id: row.seat_id,
            event_id: row.event_id,
            session_id: row.session_id,
            ticket_category: row.ticket_category,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    event_id: i64,
    session_id: String,
    total_amount: i64,
    status: String,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    access_token_hash: String,
    paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = ReservationError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let customer = match (row.customer_name, row.customer_email, row.customer_phone) {
            (Some(name), Some(email), Some(phone)) => Some(CustomerIdentity { name, email, phone }),
            _ => None,
        };
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            event_id: row.event_id,
            session_id: row.session_id,
            total_amount: row.total_amount,
            status: row.status.parse().map_err(corrupt)?,
            customer,
            expires_at: row.expires_at,
            access_token_hash: row.access_token_hash,
            paid_at: row.paid_at,
            cancelled_at: row.cancelled_at,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ItemRow {
    order_id: Uuid,
    seat_id: i64,
    seat_number: String,
    section: String,
    row_label: String,
    category: String,
    price: i64,
    active: bool,
}

impl From<ItemRow> for OrderItem {
    fn from(row: ItemRow) -> Self {
        OrderItem {
            order_id: row.order_id,
            seat_id: row.seat_id,
            seat_number: row.seat_number,
            section: row.section,
            row: row.row_label,
            category: row.category,
            price: row.price,
            active: row.active,
        }
    }
}

#[derive(FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    amount: i64,
    method: String,
    status: String,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = ReservationError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            amount: row.amount,
            method: row.method,
            status: row.status.parse().map_err(corrupt)?,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SessionLockRow {
    seat_id: i64,
    seat_number: String,
    section: String,
    row_label: String,
    number: i32,
    category: String,
    price: i64,
    ticket_category: Option<String>,
    expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ActiveLockRow {
    id: Uuid,
    seat_id: i64,
    seat_number: String,
    section: String,
    row_label: String,
    event_id: i64,
    event_name: String,
    session_id: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    time_remaining_secs: i64,
}

fn corrupt(err: crate::models::ParseStatusError) -> ReservationError {
    ReservationError::Internal(err.to_string())
}

/// Seat ids sorted and deduplicated so row locks are always taken in the same order.
fn lock_order(seat_ids: &[i64]) -> Vec<i64> {
    let mut ids = seat_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[derive(Clone)]
pub struct PgReservationStore {
    db: Database,
}

impl PgReservationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn event_for_share(
        tx: &mut Transaction<'_, Postgres>,
        event_id: i64,
    ) -> ReservationResult<Option<Event>> {
        let row: Option<EventRow> = sqlx::query_as(
            "SELECT id, name, status, starts_at FROM events WHERE id = $1 FOR SHARE",
        )
        .bind(event_id)
        .fetch_optional(&mut **tx)
        .await?;
        row.map(Event::try_from).transpose()
    }

    async fn seats_for_update(
        tx: &mut Transaction<'_, Postgres>,
        event_id: i64,
        seat_ids: &[i64],
    ) -> ReservationResult<Vec<Seat>> {
        let rows: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seats WHERE event_id = $1 AND id = ANY($2) ORDER BY id FOR UPDATE",
            SEAT_COLUMNS
        ))
        .bind(event_id)
        .bind(lock_order(seat_ids))
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn locks_for_update(
        tx: &mut Transaction<'_, Postgres>,
        seat_ids: &[i64],
    ) -> ReservationResult<Vec<Lock>> {
        let rows: Vec<LockRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seat_locks WHERE seat_id = ANY($1) ORDER BY seat_id FOR UPDATE",
            LOCK_COLUMNS
        ))
        .bind(lock_order(seat_ids))
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(Lock::from).collect())
    }

    async fn order_for_update_by_id(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> ReservationResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn load_details<'e, E>(executor: E, order: Order) -> ReservationResult<OrderDetails>
    where
        E: sqlx::Executor<'e, Database = Postgres> + Copy,
    {
        let items: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY seat_id",
            ITEM_COLUMNS
        ))
        .bind(order.id)
        .fetch_all(executor)
        .await?;
        let payment: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(order.id)
        .fetch_optional(executor)
        .await?;

        Ok(OrderDetails {
            order,
            items: items.into_iter().map(OrderItem::from).collect(),
            payment: payment.map(Payment::try_from).transpose()?,
        })
    }

    async fn details_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        order: Order,
    ) -> ReservationResult<OrderDetails> {
        let items: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY seat_id",
            ITEM_COLUMNS
        ))
        .bind(order.id)
        .fetch_all(&mut **tx)
        .await?;
        let payment: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(order.id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(OrderDetails {
            order,
            items: items.into_iter().map(OrderItem::from).collect(),
            payment: payment.map(Payment::try_from).transpose()?,
        })
    }

    /// Deactivates the order's lines, returns its RESERVED seats to sale and
    /// drops any lock rows left on them. Returns the seats actually released.
    async fn release_order_seats(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> ReservationResult<Vec<i64>> {
        let seat_ids: Vec<i64> = sqlx::query_scalar(
            "UPDATE order_items SET active = FALSE WHERE order_id = $1 AND active RETURNING seat_id",
        )
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

        if seat_ids.is_empty() {
            return Ok(seat_ids);
        }

        let mut released: Vec<i64> = sqlx::query_scalar(
            "UPDATE seats SET status = 'AVAILABLE', updated_at = $2
             WHERE id = ANY($1) AND status = 'RESERVED'
             RETURNING id",
        )
        .bind(&seat_ids)
        .bind(now)
        .fetch_all(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM seat_locks WHERE event_id = $1 AND seat_id = ANY($2)")
            .bind(event_id)
            .bind(&seat_ids)
            .execute(&mut **tx)
            .await?;

        released.sort_unstable();
        Ok(released)
    }

    async fn set_payment_status(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        status: &str,
        now: DateTime<Utc>,
    ) -> ReservationResult<()> {
        sqlx::query(
            "UPDATE payments
             SET status = $2,
                 paid_at = CASE WHEN $2 = 'PAID' THEN $3 ELSE paid_at END,
                 updated_at = $3
             WHERE order_id = $1",
        )
        .bind(order_id)
        .bind(status)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn acquire_locks(&self, claim: &LockClaim) -> ReservationResult<Vec<Lock>> {
        let mut tx = self.db.pool.begin().await?;

        let event = Self::event_for_share(&mut tx, claim.event_id).await?;
        rules::ensure_event_bookable(claim.event_id, event.as_ref())?;
        let seats = Self::seats_for_update(&mut tx, claim.event_id, &claim.seat_ids).await?;
        rules::ensure_seats_found(&claim.seat_ids, &seats)?;
        let existing = Self::locks_for_update(&mut tx, &claim.seat_ids).await?;
        rules::ensure_claimable(&seats, &existing, &claim.session_id, claim.now)?;

        let mut granted = Vec::with_capacity(claim.seat_ids.len());
        for seat_id in lock_order(&claim.seat_ids) {
            // The WHERE clause refuses to take over a live lock of another
            // session even if the checks above were somehow bypassed.
            let row: Option<LockRow> = sqlx::query_as(&format!(
                "INSERT INTO seat_locks ({cols})
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (seat_id) DO UPDATE
                 SET id = CASE WHEN seat_locks.session_id = EXCLUDED.session_id
                               THEN seat_locks.id ELSE EXCLUDED.id END,
                     created_at = CASE WHEN seat_locks.session_id = EXCLUDED.session_id
                                       THEN seat_locks.created_at ELSE EXCLUDED.created_at END,
                     event_id = EXCLUDED.event_id,
                     session_id = EXCLUDED.session_id,
                     ticket_category = EXCLUDED.ticket_category,
                     expires_at = EXCLUDED.expires_at
                 WHERE seat_locks.session_id = EXCLUDED.session_id
                    OR seat_locks.expires_at <= $7
                 RETURNING {cols}",
                cols = LOCK_COLUMNS
            ))
            .bind(Uuid::new_v4())
            .bind(seat_id)
            .bind(claim.event_id)
            .bind(&claim.session_id)
            .bind(&claim.ticket_category)
            .bind(claim.expires_at)
            .bind(claim.now)
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                Some(row) => granted.push(Lock::from(row)),
                None => {
                    tx.rollback().await?;
                    return Err(ReservationError::SeatUnavailable(vec![seat_id]));
                }
            }
        }

        tx.commit().await?;
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
        let mut tx = self.db.pool.begin().await?;

        let locks: Vec<Lock> = Self::locks_for_update(&mut tx, seat_ids)
            .await?
            .into_iter()
            .filter(|l| l.event_id == event_id)
            .collect();
        rules::ensure_extendable(seat_ids, &locks, session_id, now)?;

        let result = sqlx::query(
            "UPDATE seat_locks SET expires_at = $1
             WHERE seat_id = ANY($2) AND session_id = $3 AND event_id = $4",
        )
        .bind(expires_at)
        .bind(lock_order(seat_ids))
        .bind(session_id)
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn release_locks(&self, seat_ids: &[i64], session_id: &str) -> ReservationResult<u64> {
        let result = sqlx::query("DELETE FROM seat_locks WHERE seat_id = ANY($1) AND session_id = $2")
            .bind(lock_order(seat_ids))
            .bind(session_id)
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn session_locks(
        &self,
        session_id: &str,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> ReservationResult<Vec<SessionLock>> {
        let rows: Vec<SessionLockRow> = sqlx::query_as(
            "SELECT s.id AS seat_id, s.seat_number, s.section, s.row_label, s.number, s.category,
                    s.price, sl.ticket_category, sl.expires_at
             FROM seat_locks sl
             JOIN seats s ON s.id = sl.seat_id
             WHERE sl.session_id = $1 AND sl.event_id = $2 AND sl.expires_at > $3
             ORDER BY s.id",
        )
        .bind(session_id)
        .bind(event_id)
        .bind(now)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SessionLock {
                seat_id: r.seat_id,
                seat_number: r.seat_number,
                section: r.section,
                row: r.row_label,
                number: r.number,
                category: r.category,
                price: r.price,
                ticket_category: r.ticket_category,
                expires_at: r.expires_at,
            })
            .collect())
    }

    async fn event_seats(&self, event_id: i64) -> ReservationResult<Vec<Seat>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
            .bind(event_id)
            .fetch_one(&self.db.pool)
            .await?;
        if !exists {
            return Err(ReservationError::NotFound(format!("event {}", event_id)));
        }

        let rows: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seats WHERE event_id = $1 ORDER BY section, row_label, number",
            SEAT_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.db.pool)
        .await?;
        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn event_locks(&self, event_id: i64, now: DateTime<Utc>) -> ReservationResult<Vec<Lock>> {
        let rows: Vec<LockRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seat_locks WHERE event_id = $1 AND expires_at > $2",
            LOCK_COLUMNS
        ))
        .bind(event_id)
        .bind(now)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows.into_iter().map(Lock::from).collect())
    }

    async fn create_pending_order(&self, draft: &OrderDraft) -> ReservationResult<OrderDetails> {
        let mut tx = self.db.pool.begin().await?;

        let event = Self::event_for_share(&mut tx, draft.event_id).await?;
        rules::ensure_event_bookable(draft.event_id, event.as_ref())?;
        let seats = Self::seats_for_update(&mut tx, draft.event_id, &draft.seat_ids).await?;
        rules::ensure_seats_found(&draft.seat_ids, &seats)?;
        let locks = Self::locks_for_update(&mut tx, &draft.seat_ids).await?;
        rules::ensure_claimable(&seats, &locks, &draft.session_id, draft.now)?;

        let total_amount = rules::order_total(&seats)?;

        let order_row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO orders (id, order_number, event_id, session_id, total_amount, status,
                                 expires_at, access_token_hash, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7, $8, $8)
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(draft.order_id)
        .bind(&draft.order_number)
        .bind(draft.event_id)
        .bind(&draft.session_id)
        .bind(total_amount)
        .bind(draft.expires_at)
        .bind(&draft.access_token_hash)
        .bind(draft.now)
        .fetch_one(&mut *tx)
        .await?;

        // Price and label are copied from the seat as it is right now.
        for seat in &seats {
            sqlx::query(
                "INSERT INTO order_items (order_id, seat_id, seat_number, section, row_label,
                                          category, price, active, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8)",
            )
            .bind(draft.order_id)
            .bind(seat.id)
            .bind(&seat.seat_number)
            .bind(&seat.section)
            .bind(&seat.row)
            .bind(&seat.category)
            .bind(seat.price)
            .bind(draft.now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO payments (id, order_id, amount, method, status, created_at, updated_at)
             VALUES ($1, $2, $3, 'BANK_TRANSFER', 'PENDING', $4, $4)",
        )
        .bind(draft.payment_id)
        .bind(draft.order_id)
        .bind(total_amount)
        .bind(draft.now)
        .execute(&mut *tx)
        .await?;

        let seat_ids = lock_order(&draft.seat_ids);
        sqlx::query("UPDATE seats SET status = 'RESERVED', updated_at = $2 WHERE id = ANY($1)")
            .bind(&seat_ids)
            .bind(draft.now)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM seat_locks WHERE seat_id = ANY($1)")
            .bind(&seat_ids)
            .execute(&mut *tx)
            .await?;
        debug!(
            order_number = %draft.order_number,
            locks_consumed = deleted.rows_affected(),
            "pending order rows written"
        );

        let order = Order::try_from(order_row)?;
        let details = Self::details_in_tx(&mut tx, order).await?;
        tx.commit().await?;
        Ok(details)
    }

    async fn find_order(&self, order_number: &str) -> ReservationResult<Option<OrderDetails>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE order_number = $1",
            ORDER_COLUMNS
        ))
        .bind(order_number)
        .fetch_optional(&self.db.pool)
        .await?;

        match row {
            Some(row) => {
                let order = Order::try_from(row)?;
                Self::load_details(&self.db.pool, order).await.map(Some)
            }
            None => Ok(None),
        }
    }

    async fn claim_payment(&self, claim: &PaymentClaim) -> ReservationResult<Order> {
        let mut tx = self.db.pool.begin().await?;

        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE order_number = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(&claim.order_number)
        .fetch_optional(&mut *tx)
        .await?;
        let order = row
            .map(Order::try_from)
            .transpose()?
            .ok_or_else(|| ReservationError::NotFound(format!("order {}", claim.order_number)))?;
        rules::ensure_claimable_order(&order, &claim.access_token_hash, claim.now)?;

        let updated: OrderRow = sqlx::query_as(&format!(
            "UPDATE orders
             SET status = 'PENDING_CONFIRMATION',
                 customer_name = $2,
                 customer_email = $3,
                 customer_phone = $4,
                 expires_at = NULL,
                 updated_at = $5
             WHERE id = $1
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&claim.customer.name)
        .bind(&claim.customer.email)
        .bind(&claim.customer.phone)
        .bind(claim.now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Order::try_from(updated)
    }

    async fn finalize_payment(&self, order_id: Uuid, now: DateTime<Utc>) -> ReservationResult<OrderDetails> {
        let mut tx = self.db.pool.begin().await?;

        let order = Self::order_for_update_by_id(&mut tx, order_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("order {}", order_id)))?;
        rules::ensure_awaiting_confirmation(&order)?;

        let updated: OrderRow = sqlx::query_as(&format!(
            "UPDATE orders SET status = 'PAID', paid_at = $2, updated_at = $2
             WHERE id = $1
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        Self::set_payment_status(&mut tx, order_id, "PAID", now).await?;

        sqlx::query(
            "UPDATE seats SET status = 'SOLD', updated_at = $2
             WHERE id IN (SELECT seat_id FROM order_items WHERE order_id = $1 AND active)",
        )
        .bind(order_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let details = Self::details_in_tx(&mut tx, Order::try_from(updated)?).await?;
        tx.commit().await?;
        Ok(details)
    }

    async fn reject_payment(
        &self,
        order_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ReservationResult<OrderDetails> {
        let mut tx = self.db.pool.begin().await?;

        let order = Self::order_for_update_by_id(&mut tx, order_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("order {}", order_id)))?;
        rules::ensure_awaiting_confirmation(&order)?;

        let updated: OrderRow = sqlx::query_as(&format!(
            "UPDATE orders
             SET status = 'CANCELLED', cancelled_at = $2, cancellation_reason = $3, updated_at = $2
             WHERE id = $1
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(now)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        Self::set_payment_status(&mut tx, order_id, "FAILED", now).await?;
        Self::release_order_seats(&mut tx, order_id, order.event_id, now).await?;

        let details = Self::details_in_tx(&mut tx, Order::try_from(updated)?).await?;
        tx.commit().await?;
        Ok(details)
    }

    async fn expired_pending_orders(&self, now: DateTime<Utc>) -> ReservationResult<Vec<ExpiredOrderRef>> {
        let rows: Vec<(Uuid, String, i64, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT id, order_number, event_id, expires_at
             FROM orders
             WHERE status = 'PENDING' AND expires_at < $1
             ORDER BY expires_at",
        )
        .bind(now)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, order_number, event_id, expires_at)| ExpiredOrderRef {
                id,
                order_number,
                event_id,
                expires_at,
            })
            .collect())
    }

    async fn expire_order(&self, order_id: Uuid, now: DateTime<Utc>) -> ReservationResult<ExpireOutcome> {
        let mut tx = self.db.pool.begin().await?;

        let Some(order) = Self::order_for_update_by_id(&mut tx, order_id).await? else {
            tx.rollback().await?;
            return Ok(ExpireOutcome::Skipped);
        };
        if !order.is_past_expiry(now) {
            tx.rollback().await?;
            return Ok(ExpireOutcome::Skipped);
        }

        sqlx::query("UPDATE orders SET status = 'EXPIRED', updated_at = $2 WHERE id = $1")
            .bind(order_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        Self::set_payment_status(&mut tx, order_id, "FAILED", now).await?;
        let released_seat_ids = Self::release_order_seats(&mut tx, order_id, order.event_id, now).await?;

        tx.commit().await?;
        Ok(ExpireOutcome::Expired {
            event_id: order.event_id,
            order_number: order.order_number,
            released_seat_ids,
        })
    }

    async fn delete_expired_locks(&self, now: DateTime<Utc>) -> ReservationResult<u64> {
        let result = sqlx::query("DELETE FROM seat_locks WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn active_locks(
        &self,
        event_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> ReservationResult<Vec<ActiveLockView>> {
        let rows: Vec<ActiveLockRow> = sqlx::query_as(
            "SELECT sl.id, sl.seat_id, s.seat_number, s.section, s.row_label, sl.event_id,
                    e.name AS event_name, sl.session_id, sl.expires_at, sl.created_at,
                    GREATEST(0, EXTRACT(EPOCH FROM (sl.expires_at - $1))::BIGINT) AS time_remaining_secs
             FROM seat_locks sl
             JOIN seats s ON s.id = sl.seat_id
             JOIN events e ON e.id = sl.event_id
             WHERE sl.expires_at > $1
               AND ($2::BIGINT IS NULL OR sl.event_id = $2)
             ORDER BY sl.expires_at ASC",
        )
        .bind(now)
        .bind(event_id)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ActiveLockView {
                id: r.id,
                seat_id: r.seat_id,
                seat_number: r.seat_number,
                section: r.section,
                row: r.row_label,
                event_id: r.event_id,
                event_name: r.event_name,
                session_id: r.session_id,
                expires_at: r.expires_at,
                created_at: r.created_at,
                time_remaining_secs: r.time_remaining_secs,
            })
            .collect())
    }

    async fn delete_lock(&self, lock_id: Uuid) -> ReservationResult<Option<Lock>> {
        let row: Option<LockRow> = sqlx::query_as(&format!(
            "DELETE FROM seat_locks WHERE id = $1 RETURNING {}",
            LOCK_COLUMNS
        ))
        .bind(lock_id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row.map(Lock::from))
    }

    async fn clear_locks(&self) -> ReservationResult<u64> {
        let result = sqlx::query("DELETE FROM seat_locks")
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
