//! Operation Context
//!
//! Metadata about the current operation for audit and tracing. Populated by
//! the transport collaborator; the engine only reads it.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Context for an operation, used for auditing, tracing, and as an input to
/// geography-anomaly scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// Party that initiated the intent (customer or operator id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<Uuid>,

    /// Submission channel (e.g. "mobile", "branch", "api")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,

    /// Region the submission originated from, if the transport resolved one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_region: Option<String>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initiator(mut self, initiated_by: Uuid) -> Self {
        self.initiated_by = Some(initiated_by);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn with_origin_region(mut self, region: impl Into<String>) -> Self {
        self.origin_region = Some(region.into());
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}
