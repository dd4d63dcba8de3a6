//! Best-effort side channel for everything that must never fail or slow a
//! settlement: seat-map cache invalidation, customer notifications and the
//! audit trail.
//!
//! Services push [`Notice`] values with [`SideChannel::emit`]; a detached
//! [`SideChannelWorker`] drains them.

pub mod audit;
pub mod circuit_breaker;
pub mod webhook;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::SeatMapCache;
pub use audit::{AuditEntry, AuditSink, PgAuditSink, TracingAuditSink};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use webhook::{LogNotifier, Notifier, NotifyError, WebhookNotifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notice {
    /// Persisted seat status changed for some seats of the event.
    #[serde(rename_all = "camelCase")]
    SeatsChanged { event_id: i64 },
    #[serde(rename_all = "camelCase")]
    PaymentClaimed {
        order_id: Uuid,
        order_number: String,
        event_id: i64,
        customer_email: String,
    },
    #[serde(rename_all = "camelCase")]
    PaymentFinalized {
        order_id: Uuid,
        order_number: String,
        event_id: i64,
        actor: String,
    },
    #[serde(rename_all = "camelCase")]
    PaymentRejected {
        order_id: Uuid,
        order_number: String,
        event_id: i64,
        actor: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    OrderExpired {
        order_id: Uuid,
        order_number: String,
        event_id: i64,
    },
}

impl Notice {
    pub fn event_id(&self) -> i64 {
        match self {
            Notice::SeatsChanged { event_id }
            | Notice::PaymentClaimed { event_id, .. }
            | Notice::PaymentFinalized { event_id, .. }
            | Notice::PaymentRejected { event_id, .. }
            | Notice::OrderExpired { event_id, .. } => *event_id,
        }
    }

    fn is_customer_facing(&self) -> bool {
        !matches!(self, Notice::SeatsChanged { .. })
    }
}

/// Sending half. Cloned into every service.
#[derive(Clone, Debug)]
pub struct SideChannel {
    tx: mpsc::UnboundedSender<Notice>,
}

impl SideChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Never blocks and never fails the caller; a closed channel is only logged.
    pub fn emit(&self, notice: Notice) {
        if let Err(e) = self.tx.send(notice) {
            warn!(notice = ?e.0, "side channel closed, notice dropped");
        }
    }
}

pub struct SideChannelWorker {
    rx: mpsc::UnboundedReceiver<Notice>,
    cache: Option<SeatMapCache>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl SideChannelWorker {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Notice>,
        cache: Option<SeatMapCache>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { rx, cache, notifier, audit }
    }

    /// Runs until every [`SideChannel`] clone has been dropped, then waits
    /// for in-flight dispatches before returning.
    ///
    /// Cache invalidation happens inline, in arrival order. Notifier and audit
    /// calls run as separate tasks so a slow webhook never delays the next
    /// invalidation.
    pub async fn run(mut self) {
        let mut dispatches = JoinSet::new();
        while let Some(notice) = self.rx.recv().await {
            self.invalidate(&notice).await;
            dispatches.spawn(dispatch(self.notifier.clone(), self.audit.clone(), notice));
            while dispatches.try_join_next().is_some() {}
        }
        while dispatches.join_next().await.is_some() {}
        debug!("side channel worker stopped");
    }

    async fn invalidate(&self, notice: &Notice) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate(notice.event_id()).await {
                warn!(event_id = notice.event_id(), error = %e, "seat map invalidation failed");
            }
        }
    }
}

async fn dispatch(notifier: Arc<dyn Notifier>, audit: Arc<dyn AuditSink>, notice: Notice) {
    if notice.is_customer_facing() {
        if let Err(e) = notifier.notify(&notice).await {
            warn!(notice = ?notice, error = %e, "notification dispatch failed");
        }
    }

    if let Some(entry) = AuditEntry::from_notice(&notice) {
        if let Err(e) = audit.record(&entry).await {
            warn!(action = entry.action, entity_id = %entry.entity_id, error = %e, "audit record failed");
        }
    }
}
