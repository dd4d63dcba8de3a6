pub mod locks;
pub mod orders;
pub mod settlement;
pub mod sweeper;

pub use locks::{LockExtension, LockGrant, LockManager};
pub use orders::{OrderAssembler, PendingOrder};
pub use settlement::{PaymentClaimReceipt, PaymentSettlement};
pub use sweeper::{ExpirationSweeper, SweepSummary};

use std::collections::HashSet;
use std::future::Future;
use tracing::warn;

use crate::error::{ReservationError, ReservationResult};

/// Runs `op` and, if storage reported a serialization conflict, runs it exactly once more.
pub(crate) async fn retry_on_conflict<T, F, Fut>(operation: &'static str, mut op: F) -> ReservationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ReservationResult<T>>,
{
    match op().await {
        Err(e) if e.is_retryable() => {
            warn!(operation, "storage conflict, retrying once");
            op().await
        }
        other => other,
    }
}

/// Seat-id list checks shared by every seat-taking operation.
pub(crate) fn check_seat_ids(seat_ids: &[i64], max: usize) -> ReservationResult<()> {
    if seat_ids.is_empty() {
        return Err(ReservationError::Validation("seatIds must not be empty".to_string()));
    }
    if seat_ids.len() > max {
        return Err(ReservationError::Validation(format!(
            "at most {} seats may be requested at once",
            max
        )));
    }
    if seat_ids.iter().any(|id| *id <= 0) {
        return Err(ReservationError::Validation("seatIds must be positive".to_string()));
    }
    let unique: HashSet<i64> = seat_ids.iter().copied().collect();
    if unique.len() != seat_ids.len() {
        return Err(ReservationError::Validation("seatIds must not contain duplicates".to_string()));
    }
    Ok(())
}

/// Release is fire-and-forget, so it takes any non-empty list of positive ids
/// and collapses repeats instead of refusing them. No per-request cap: a
/// session may hold more seats than one acquire call allows.
pub(crate) fn normalize_release_ids(seat_ids: &[i64]) -> ReservationResult<Vec<i64>> {
    if seat_ids.is_empty() {
        return Err(ReservationError::Validation("seatIds must not be empty".to_string()));
    }
    if seat_ids.iter().any(|id| *id <= 0) {
        return Err(ReservationError::Validation("seatIds must be positive".to_string()));
    }
    let mut ids = seat_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Prefix of a session id that is safe to put in logs.
pub(crate) fn short_session(session_id: &str) -> &str {
    match session_id.char_indices().nth(8) {
        Some((idx, _)) => &session_id[..idx],
        None => session_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn release_ids_are_deduplicated_not_capped() {
        let many: Vec<i64> = (1..=40).rev().collect();
        assert_eq!(normalize_release_ids(&many).unwrap().len(), 40);
        assert_eq!(normalize_release_ids(&[4, 4, 2]).unwrap(), vec![2, 4]);
        assert!(matches!(normalize_release_ids(&[]), Err(ReservationError::Validation(_))));
        assert!(matches!(normalize_release_ids(&[3, 0]), Err(ReservationError::Validation(_))));
    }

    #[test]
    fn seat_id_checks() {
        assert!(check_seat_ids(&[1, 2, 3], 10).is_ok());
        assert!(matches!(check_seat_ids(&[], 10), Err(ReservationError::Validation(_))));
        assert!(matches!(check_seat_ids(&[1, 1], 10), Err(ReservationError::Validation(_))));
        assert!(matches!(check_seat_ids(&[1, 2, 3], 2), Err(ReservationError::Validation(_))));
        assert!(matches!(check_seat_ids(&[0], 10), Err(ReservationError::Validation(_))));
    }

    #[test]
    fn session_prefix_respects_char_boundaries() {
        assert_eq!(short_session("abcdefghijkl"), "abcdefgh");
        assert_eq!(short_session("abc"), "abc");
        assert_eq!(short_session("ééééééééé"), "éééééééé");
    }

    #[tokio::test]
    async fn conflict_is_retried_exactly_once() {
        let calls = AtomicU32::new(0);
        let result: ReservationResult<()> = retry_on_conflict("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ReservationError::ConflictAborted)
        })
        .await;
        assert!(matches!(result, Err(ReservationError::ConflictAborted)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ReservationResult<()> = retry_on_conflict("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ReservationError::SeatUnavailable(vec![1]))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
