//! The signed JSON wrapper actually transmitted over the wire.
//!
//! Field names and the event-type strings are an external contract.
//! `delivery_id` is the receiver-side idempotency key: retries resend an
//! envelope carrying the same `delivery_id` as the first attempt.

use chrono::{DateTime, Utc};
use portside_events::EventType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire envelope schema version.
pub const API_VERSION: &str = "1.0";

/// Deployment environment tag carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

impl Environment {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The delivered JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventType,
    pub timestamp: DateTime<Utc>,
    pub webhook_id: Uuid,
    pub delivery_id: Uuid,
    pub api_version: String,
    pub environment: Environment,
    pub data: serde_json::Value,
}

impl Envelope {
    #[must_use]
    pub fn new(
        event: EventType,
        timestamp: DateTime<Utc>,
        webhook_id: Uuid,
        delivery_id: Uuid,
        environment: Environment,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event,
            timestamp,
            webhook_id,
            delivery_id,
            api_version: API_VERSION.to_string(),
            environment,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_wire_field_names() {
        let envelope = Envelope::new(
            EventType::OrderCreated,
            Utc::now(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Environment::Staging,
            serde_json::json!({"order_id": "ord_123"}),
        );

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["event"], "order.created");
        assert_eq!(value["api_version"], "1.0");
        assert_eq!(value["environment"], "staging");
        assert_eq!(value["data"]["order_id"], "ord_123");
        assert!(value.get("webhook_id").is_some());
        assert!(value.get("delivery_id").is_some());
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn environment_strings() {
        assert_eq!(Environment::Production.as_str(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
    }
}
