//! Audit events
//!
//! Every create/score/commit/reversal/failure emits an audit event to a
//! pluggable sink consumed by the audit/logging collaborator. Sink failures
//! are logged and never fail the money movement itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::OperationContext;

/// One audit event, shaped for the downstream consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub status: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn builder(action: impl Into<String>) -> AuditEventBuilder {
        AuditEventBuilder::new(action)
    }
}

/// Builder for audit events
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    event_type: String,
    entity_type: String,
    entity_id: Option<Uuid>,
    action: String,
    status: String,
    details: serde_json::Value,
    correlation_id: Option<Uuid>,
}

impl AuditEventBuilder {
    pub fn new(action: impl Into<String>) -> Self {
        let action = action.into();
        // default event_type to the action prefix, e.g. "transaction.posted"
        // -> "transaction"
        let event_type = action
            .split('.')
            .next()
            .unwrap_or(action.as_str())
            .to_string();
        Self {
            event_type,
            entity_type: String::new(),
            entity_id: None,
            action,
            status: "ok".to_string(),
            details: serde_json::Value::Null,
            correlation_id: None,
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: Uuid) -> Self {
        self.entity_type = entity_type.to_string();
        self.entity_id = Some(entity_id);
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn context(mut self, context: &OperationContext) -> Self {
        self.correlation_id = context.correlation_id;
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            event_type: self.event_type,
            entity_type: self.entity_type,
            entity_id: self.entity_id.unwrap_or(Uuid::nil()),
            action: self.action,
            status: self.status,
            details: self.details,
            correlation_id: self.correlation_id,
            timestamp: Utc::now(),
        }
    }
}

/// Audit sink errors
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Sink that emits structured tracing events. The default wiring for the
/// service binary; a log shipper picks them up downstream.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "corebank::audit",
            audit_id = %event.id,
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            status = %event.status,
            details = %event.details,
            "audit"
        );
        Ok(())
    }
}

/// Capturing sink for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    pub async fn count_by_action(&self, action: &str) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults_event_type_from_action() {
        let event = AuditEvent::builder("transaction.posted")
            .entity("transaction", Uuid::new_v4())
            .details(json!({"legs": 2}))
            .build();

        assert_eq!(event.event_type, "transaction");
        assert_eq!(event.action, "transaction.posted");
        assert_eq!(event.status, "ok");
        assert_eq!(event.details["legs"], 2);
    }

    #[test]
    fn test_builder_carries_correlation_id() {
        let correlation_id = Uuid::new_v4();
        let context = OperationContext::new().with_correlation_id(correlation_id);

        let event = AuditEvent::builder("fraud.scored").context(&context).build();
        assert_eq!(event.correlation_id, Some(correlation_id));
    }

    #[tokio::test]
    async fn test_memory_sink_captures_events() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEvent::builder("transaction.created").build())
            .await
            .unwrap();
        sink.record(AuditEvent::builder("transaction.posted").build())
            .await
            .unwrap();
        sink.record(AuditEvent::builder("transaction.posted").build())
            .await
            .unwrap();

        assert_eq!(sink.events().await.len(), 3);
        assert_eq!(sink.count_by_action("transaction.posted").await, 2);
    }
}
