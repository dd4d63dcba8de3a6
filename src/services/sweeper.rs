use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::ReservationResult;
use crate::notify::{Notice, SideChannel};
use crate::store::{ExpireOutcome, ExpiredOrderRef, ReservationStore};

/// Result of one `expire_orders` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub total_found: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Orders that left PENDING between discovery and their own transaction.
    pub skipped_count: usize,
}

enum OrderSweep {
    Expired,
    Skipped,
    Failed,
}

/// Reclaims seats from abandoned locks and orders.
///
/// Triggered externally (cron endpoints) or by the optional in-process loop.
/// Only touches rows already past expiry, so it is safe to run alongside
/// live traffic and to run twice.
pub struct ExpirationSweeper {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    side_channel: SideChannel,
    concurrency: usize,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        side_channel: SideChannel,
        concurrency: usize,
    ) -> Self {
        Self { store, clock, side_channel, concurrency: concurrency.max(1) }
    }

    /// Expires every PENDING order past its deadline. One order failing
    /// never stops the others; it stays PENDING and the next pass retries it.
    pub async fn expire_orders(&self) -> ReservationResult<SweepSummary> {
        let now = self.clock.now();
        let expired = self.store.expired_pending_orders(now).await?;

        let mut summary = SweepSummary { total_found: expired.len(), ..SweepSummary::default() };
        if expired.is_empty() {
            info!("⏰ No expired orders to sweep");
            return Ok(summary);
        }

        info!("⏰ Found {} expired orders to sweep", expired.len());

        let outcomes: Vec<OrderSweep> = stream::iter(expired)
            .map(|order| self.expire_one(order))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                OrderSweep::Expired => summary.success_count += 1,
                OrderSweep::Skipped => summary.skipped_count += 1,
                OrderSweep::Failed => summary.error_count += 1,
            }
        }

        info!(
            total = summary.total_found,
            expired = summary.success_count,
            skipped = summary.skipped_count,
            failed = summary.error_count,
            "✅ Order sweep completed"
        );
        Ok(summary)
    }

    async fn expire_one(&self, order: ExpiredOrderRef) -> OrderSweep {
        // Fresh "now" per order: the batch may take a while under load.
        match self.store.expire_order(order.id, self.clock.now()).await {
            Ok(ExpireOutcome::Expired { event_id, order_number, released_seat_ids }) => {
                self.side_channel.emit(Notice::SeatsChanged { event_id });
                self.side_channel.emit(Notice::OrderExpired {
                    order_id: order.id,
                    order_number: order_number.clone(),
                    event_id,
                });
                info!(
                    "🎫 Order {} expired, {} seats released",
                    order_number,
                    released_seat_ids.len()
                );
                OrderSweep::Expired
            }
            Ok(ExpireOutcome::Skipped) => {
                info!("🎫 Order {} left PENDING before its sweep, skipped", order.order_number);
                OrderSweep::Skipped
            }
            Err(e) => {
                error!(
                    order_number = %order.order_number,
                    expires_at = ?order.expires_at,
                    error = %e,
                    "🎫 Failed to expire order"
                );
                OrderSweep::Failed
            }
        }
    }

    /// Deletes every lock row past its expiry, converted or not.
    pub async fn cleanup_expired_locks(&self) -> ReservationResult<u64> {
        let deleted = self.store.delete_expired_locks(self.clock.now()).await?;
        if deleted == 0 {
            info!("🔑 No expired locks to clean up");
        } else {
            info!("🔑 Cleaned up {} expired locks", deleted);
        }
        Ok(deleted)
    }

    /// Both passes, in the order the cron endpoints are usually hit.
    pub async fn run_once(&self) {
        info!("🧹 Starting sweep");
        if let Err(e) = self.expire_orders().await {
            error!(error = %e, "order sweep failed");
        }
        if let Err(e) = self.cleanup_expired_locks().await {
            error!(error = %e, "lock cleanup failed");
        }
        info!("🧹 Sweep finished");
    }
}
