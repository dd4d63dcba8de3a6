use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::Notice;
use crate::database::Database;
use crate::error::ReservationResult;

/// One row of the administrative audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor: String,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub metadata: Option<Value>,
}

impl AuditEntry {
    /// Only administrative settlement decisions are audited.
    pub fn from_notice(notice: &Notice) -> Option<Self> {
        match notice {
            Notice::PaymentFinalized { order_id, order_number, actor, .. } => Some(AuditEntry {
                actor: actor.clone(),
                action: "PAYMENT_CONFIRMED",
                entity: "order",
                entity_id: order_id.to_string(),
                old_value: Some(json!({ "status": "PENDING_CONFIRMATION" })),
                new_value: Some(json!({ "status": "PAID" })),
                metadata: Some(json!({ "orderNumber": order_number })),
            }),
            Notice::PaymentRejected { order_id, order_number, actor, reason, .. } => Some(AuditEntry {
                actor: actor.clone(),
                action: "PAYMENT_REJECTED",
                entity: "order",
                entity_id: order_id.to_string(),
                old_value: Some(json!({ "status": "PENDING_CONFIRMATION" })),
                new_value: Some(json!({ "status": "CANCELLED", "reason": reason })),
                metadata: Some(json!({ "orderNumber": order_number })),
            }),
            _ => None,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> ReservationResult<()>;
}

pub struct PgAuditSink {
    db: Database,
}

impl PgAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, entry: &AuditEntry) -> ReservationResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (actor, action, entity, entity_id, old_value, new_value, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&entry.actor)
        .bind(entry.action)
        .bind(entry.entity)
        .bind(&entry.entity_id)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(&entry.metadata)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }
}

/// Writes audit entries to the log only. Used when no database sink is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> ReservationResult<()> {
        info!(
            target: "audit",
            actor = %entry.actor,
            action = entry.action,
            entity = entry.entity,
            entity_id = %entry.entity_id,
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn only_admin_decisions_are_audited() {
        let order_id = Uuid::new_v4();
        let rejected = Notice::PaymentRejected {
            order_id,
            order_number: "TKHAAAAAA".into(),
            event_id: 1,
            actor: "admin".into(),
            reason: "no transfer received".into(),
        };
        let entry = AuditEntry::from_notice(&rejected).unwrap();
        assert_eq!(entry.action, "PAYMENT_REJECTED");
        assert_eq!(entry.entity_id, order_id.to_string());
        assert_eq!(entry.new_value.unwrap()["reason"], "no transfer received");

        assert!(AuditEntry::from_notice(&Notice::SeatsChanged { event_id: 1 }).is_none());
    }
}
