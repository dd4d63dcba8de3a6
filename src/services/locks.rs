//! Lock Manager: temporary, session-scoped seat claims.
//!
//! A lock never changes the persisted seat status. The seat map derives
//! LOCKED from a live lock row, so a lock that simply runs out needs no
//! write to become invisible.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{check_seat_ids, normalize_release_ids, retry_on_conflict, short_session};
use crate::cache::{SeatMapCache, SeatMapLookup};
use crate::clock::Clock;
use crate::config::ReservationConfig;
use crate::error::{ReservationError, ReservationResult};
use crate::models::requests::{AcquireLocksRequest, ExtendLocksRequest, ReleaseLocksRequest};
use crate::models::{ActiveLockView, Lock, Seat, SeatStatus, SeatView, SessionLock};
use crate::store::{LockClaim, ReservationStore};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockGrant {
    pub locked_seats: Vec<i64>,
    pub expires_at: DateTime<Utc>,
    /// Seconds until `expires_at`.
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockExtension {
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

pub struct LockManager {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    cache: Option<SeatMapCache>,
    config: ReservationConfig,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        cache: Option<SeatMapCache>,
        config: ReservationConfig,
    ) -> Self {
        Self { store, clock, cache, config }
    }

    pub async fn acquire(&self, req: AcquireLocksRequest) -> ReservationResult<LockGrant> {
        req.validate()?;
        check_seat_ids(&req.seat_ids, self.config.max_seats_per_request)?;

        let lock_ttl = self.config.lock_ttl();
        let locks = retry_on_conflict("acquire_locks", || {
            let now = self.clock.now();
            let claim = LockClaim {
                event_id: req.event_id,
                seat_ids: req.seat_ids.clone(),
                session_id: req.session_id.clone(),
                ticket_category: req.ticket_category.clone(),
                expires_at: now + lock_ttl,
                now,
            };
            async move { self.store.acquire_locks(&claim).await }
        })
        .await?;

        let expires_at = locks
            .iter()
            .map(|l| l.expires_at)
            .min()
            .ok_or_else(|| ReservationError::Internal("lock acquisition returned no locks".to_string()))?;
        let mut locked_seats: Vec<i64> = locks.iter().map(|l| l.seat_id).collect();
        locked_seats.sort_unstable();

        info!(
            event_id = req.event_id,
            session = short_session(&req.session_id),
            seats = ?locked_seats,
            "🔒 seats locked"
        );

        Ok(LockGrant {
            locked_seats,
            expires_at,
            expires_in: self.seconds_until(expires_at),
        })
    }

    /// Raises every listed lock to the checkout window.
    pub async fn extend(&self, req: ExtendLocksRequest) -> ReservationResult<LockExtension> {
        req.validate()?;
        check_seat_ids(&req.seat_ids, self.config.max_seats_per_request)?;

        let checkout_ttl = self.config.checkout_lock_ttl();
        let req = &req;
        let (expires_at, extended) = retry_on_conflict("extend_locks", || {
            let now = self.clock.now();
            let expires_at = now + checkout_ttl;
            async move {
                let extended = self
                    .store
                    .extend_locks(req.event_id, &req.seat_ids, &req.session_id, expires_at, now)
                    .await?;
                Ok((expires_at, extended))
            }
        })
        .await?;

        debug!(
            event_id = req.event_id,
            session = short_session(&req.session_id),
            extended,
            "lock expiry extended to checkout window"
        );

        Ok(LockExtension { expires_at, expires_in: self.seconds_until(expires_at) })
    }

    /// Idempotent; releasing seats that are not locked is not an error.
    pub async fn release(&self, req: ReleaseLocksRequest) -> ReservationResult<u64> {
        req.validate()?;
        let seat_ids = normalize_release_ids(&req.seat_ids)?;

        let released = self.store.release_locks(&seat_ids, &req.session_id).await?;
        debug!(session = short_session(&req.session_id), released, "🔓 seats released");
        Ok(released)
    }

    pub async fn session_locks(&self, session_id: &str, event_id: i64) -> ReservationResult<Vec<SessionLock>> {
        validate_session_id(session_id)?;
        self.store.session_locks(session_id, event_id, self.clock.now()).await
    }

    /// All seats of the event as `session_id` should see them.
    pub async fn seat_map(&self, event_id: i64, session_id: Option<&str>) -> ReservationResult<Vec<SeatView>> {
        if let Some(session_id) = session_id {
            validate_session_id(session_id)?;
        }

        let seats = self.base_seats(event_id).await?;
        let now = self.clock.now();
        let locks: HashMap<i64, _> = self
            .store
            .event_locks(event_id, now)
            .await?
            .into_iter()
            .filter(|l| l.is_active(now))
            .map(|l| (l.seat_id, l))
            .collect();

        Ok(seats
            .into_iter()
            .map(|seat| {
                let lock = locks.get(&seat.id);
                let locked_by_me = match (lock, session_id) {
                    (Some(lock), Some(session)) => lock.is_held_by(session),
                    _ => false,
                };
                let locked_by_other = lock.is_some() && !locked_by_me;
                let effective_status = match (seat.status, lock) {
                    (SeatStatus::Available, Some(_)) => SeatStatus::Locked,
                    (status, _) => status,
                };
                SeatView {
                    effective_status,
                    locked_by_me,
                    locked_by_other,
                    lock_expires_at: lock.map(|l| l.expires_at),
                    seat,
                }
            })
            .collect())
    }

    pub async fn active_locks(&self, event_id: Option<i64>) -> ReservationResult<Vec<ActiveLockView>> {
        self.store.active_locks(event_id, self.clock.now()).await
    }

    /// Administrative removal of a single lock, whoever holds it.
    pub async fn force_release(&self, lock_id: Uuid, actor: &str) -> ReservationResult<Lock> {
        let lock = self
            .store
            .delete_lock(lock_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("lock {}", lock_id)))?;
        info!(
            lock_id = %lock.id,
            seat_id = lock.seat_id,
            session = short_session(&lock.session_id),
            actor,
            "🔓 lock force-released"
        );
        Ok(lock)
    }

    /// Emergency reset of every lock.
    pub async fn clear_all(&self, actor: &str) -> ReservationResult<u64> {
        let cleared = self.store.clear_locks().await?;
        warn!(cleared, actor, "all seat locks cleared");
        Ok(cleared)
    }

    async fn base_seats(&self, event_id: i64) -> ReservationResult<Vec<Seat>> {
        // generation is read before the store so a concurrent invalidation
        // orphans this fill instead of being overwritten by it
        let mut fill_generation = None;
        if let Some(cache) = &self.cache {
            match cache.lookup(event_id).await {
                Ok(SeatMapLookup::Hit(seats)) => return Ok(seats),
                Ok(SeatMapLookup::Miss { generation }) => fill_generation = Some(generation),
                Err(e) => warn!(event_id, error = %e, "seat map cache read failed, using store"),
            }
        }

        let seats = self.store.event_seats(event_id).await?;

        if let (Some(cache), Some(generation)) = (&self.cache, fill_generation) {
            if let Err(e) = cache.save_seats(event_id, generation, &seats).await {
                warn!(event_id, error = %e, "seat map cache write failed");
            }
        }
        Ok(seats)
    }

    fn seconds_until(&self, at: DateTime<Utc>) -> i64 {
        (at - self.clock.now()).num_seconds().max(0)
    }
}

fn validate_session_id(session_id: &str) -> ReservationResult<()> {
    let len = session_id.chars().count();
    if len == 0 || len > 64 {
        return Err(ReservationError::Validation(
            "sessionId must be 1 to 64 characters".to_string(),
        ));
    }
    Ok(())
}
