//! Payment Settlement.
//!
//! The customer's "I have paid" moves a PENDING order to
//! PENDING_CONFIRMATION and takes it out of the expiry sweep. Seats only
//! become SOLD when an administrator finalizes the payment.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::retry_on_conflict;
use crate::clock::Clock;
use crate::error::{ReservationError, ReservationResult};
use crate::models::requests::{ConfirmPaymentRequest, RejectPaymentRequest};
use crate::models::{OrderDetails, OrderStatus};
use crate::notify::{Notice, SideChannel};
use crate::store::{PaymentClaim, ReservationStore};
use crate::token;

const AWAITING_CONFIRMATION_MESSAGE: &str =
    "Payment submitted. Your order is awaiting manual confirmation by the organizer.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentClaimReceipt {
    pub order_number: String,
    pub status: OrderStatus,
    pub message: &'static str,
}

pub struct PaymentSettlement {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    side_channel: SideChannel,
}

impl PaymentSettlement {
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>, side_channel: SideChannel) -> Self {
        Self { store, clock, side_channel }
    }

    pub async fn confirm_payment(&self, req: ConfirmPaymentRequest) -> ReservationResult<PaymentClaimReceipt> {
        req.validate()?;

        let access_token_hash = token::hash_token(&req.access_token);
        let req = &req;
        let access_token_hash = &access_token_hash;
        let order = retry_on_conflict("claim_payment", || {
            let claim = PaymentClaim {
                order_number: req.order_number.clone(),
                access_token_hash: access_token_hash.clone(),
                customer: req.customer.clone(),
                now: self.clock.now(),
            };
            async move { self.store.claim_payment(&claim).await }
        })
        .await
        .inspect_err(|e| {
            if matches!(e, ReservationError::Unauthorized) {
                warn!(order_number = %req.order_number, "payment claim with a wrong access token");
            }
        })?;

        self.side_channel.emit(Notice::PaymentClaimed {
            order_id: order.id,
            order_number: order.order_number.clone(),
            event_id: order.event_id,
            customer_email: req.customer.email.clone(),
        });
        info!(order_number = %order.order_number, "💳 payment claimed, awaiting confirmation");

        Ok(PaymentClaimReceipt {
            order_number: order.order_number,
            status: order.status,
            message: AWAITING_CONFIRMATION_MESSAGE,
        })
    }

    /// Stateless lookup: the access token is the only credential.
    pub async fn get_order(&self, order_number: &str, access_token: &str) -> ReservationResult<OrderDetails> {
        if access_token.is_empty() {
            return Err(ReservationError::Unauthorized);
        }

        let details = self
            .store
            .find_order(order_number)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("order {}", order_number)))?;

        if !token::hashes_match(&details.order.access_token_hash, &token::hash_token(access_token)) {
            return Err(ReservationError::Unauthorized);
        }
        Ok(details)
    }

    /// PENDING_CONFIRMATION → PAID. Administrative.
    pub async fn finalize_payment(&self, order_id: Uuid, actor: &str) -> ReservationResult<OrderDetails> {
        let details = retry_on_conflict("finalize_payment", || {
            self.store.finalize_payment(order_id, self.clock.now())
        })
        .await?;

        let order = &details.order;
        self.side_channel.emit(Notice::SeatsChanged { event_id: order.event_id });
        self.side_channel.emit(Notice::PaymentFinalized {
            order_id: order.id,
            order_number: order.order_number.clone(),
            event_id: order.event_id,
            actor: actor.to_string(),
        });
        info!(order_number = %order.order_number, actor, "✅ payment finalized, seats sold");
        Ok(details)
    }

    /// PENDING_CONFIRMATION → CANCELLED, seats back on sale. Administrative.
    pub async fn reject_payment(
        &self,
        order_id: Uuid,
        req: RejectPaymentRequest,
        actor: &str,
    ) -> ReservationResult<OrderDetails> {
        req.validate()?;

        let details = retry_on_conflict("reject_payment", || {
            self.store.reject_payment(order_id, &req.reason, self.clock.now())
        })
        .await?;

        let order = &details.order;
        self.side_channel.emit(Notice::SeatsChanged { event_id: order.event_id });
        self.side_channel.emit(Notice::PaymentRejected {
            order_id: order.id,
            order_number: order.order_number.clone(),
            event_id: order.event_id,
            actor: actor.to_string(),
            reason: req.reason.clone(),
        });
        info!(order_number = %order.order_number, actor, "❌ payment rejected, seats released");
        Ok(details)
    }
}
