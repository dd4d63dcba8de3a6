//! Order Assembler: turns held (or free) seats into a priced PENDING order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{check_seat_ids, retry_on_conflict, short_session};
use crate::clock::Clock;
use crate::config::ReservationConfig;
use crate::error::ReservationResult;
use crate::models::requests::CreatePendingOrderRequest;
use crate::models::OrderItem;
use crate::notify::{Notice, SideChannel};
use crate::store::{OrderDraft, ReservationStore};
use crate::token::{self, AccessToken};

/// Returned once at creation. `access_token` is never retrievable again.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrder {
    pub order_id: Uuid,
    pub order_number: String,
    pub access_token: String,
    pub total_amount: i64,
    pub expires_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

pub struct OrderAssembler {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    side_channel: SideChannel,
    config: ReservationConfig,
}

impl OrderAssembler {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        side_channel: SideChannel,
        config: ReservationConfig,
    ) -> Self {
        Self { store, clock, side_channel, config }
    }

    pub async fn create_pending_order(&self, req: CreatePendingOrderRequest) -> ReservationResult<PendingOrder> {
        req.validate()?;
        check_seat_ids(&req.seat_ids, self.config.max_seats_per_request)?;

        let order_ttl = self.config.order_ttl();
        let req = &req;
        // A retry mints a fresh number and token, so an order-number collision
        // resolves itself on the second attempt.
        let (details, access_token) = retry_on_conflict("create_pending_order", || {
            let now = self.clock.now();
            let AccessToken { plaintext, hash } = AccessToken::generate();
            let draft = OrderDraft {
                order_id: Uuid::new_v4(),
                payment_id: Uuid::new_v4(),
                order_number: token::generate_order_number(),
                event_id: req.event_id,
                session_id: req.session_id.clone(),
                seat_ids: req.seat_ids.clone(),
                access_token_hash: hash,
                expires_at: now + order_ttl,
                now,
            };
            async move {
                let details = self.store.create_pending_order(&draft).await?;
                Ok((details, plaintext))
            }
        })
        .await?;

        self.side_channel.emit(Notice::SeatsChanged { event_id: req.event_id });

        let order = details.order;
        info!(
            order_number = %order.order_number,
            event_id = order.event_id,
            session = short_session(&req.session_id),
            seats = details.items.len(),
            total = order.total_amount,
            "🎫 pending order created"
        );

        Ok(PendingOrder {
            order_id: order.id,
            order_number: order.order_number,
            access_token,
            total_amount: order.total_amount,
            // Always set while PENDING; fall back to creation time plus TTL.
            expires_at: order.expires_at.unwrap_or(order.created_at + order_ttl),
            items: details.items,
        })
    }
}
