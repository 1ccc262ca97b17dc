//! Delivery log: the mutable record tracking one event's delivery attempts
//! to one subscription, through to a terminal state.
//!
//! Invariants:
//! - `next_retry_at` is `Some` iff `status == Retry`;
//! - `attempts` only increases, and only via the store's claim operation;
//! - `Success` and `Abandoned` are terminal.

use chrono::{DateTime, Utc};
use portside_events::EventType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatcher::WebhookEvent;
use crate::models::subscription::Subscription;

/// Delivery lifecycle states.
///
/// `InFlight` is the claim marker: an attempt may only proceed after the
/// store has atomically moved the log from `Pending`/`Retry` into `InFlight`,
/// which is what keeps the timer and sweep retry paths from double-firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InFlight,
    Success,
    Retry,
    Abandoned,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Abandoned => "abandoned",
        }
    }

    /// Whether the record can never be attempted again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Abandoned)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified delivery failure, recorded per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryErrorKind {
    #[serde(rename = "network_error")]
    Network,
    #[serde(rename = "timeout_error")]
    Timeout,
    #[serde(rename = "http_error")]
    Http,
    #[serde(rename = "server_error")]
    Server,
    #[serde(rename = "rate_limit_error")]
    RateLimit,
    #[serde(rename = "authentication_error")]
    Authentication,
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "unknown_error")]
    Unknown,
}

impl DeliveryErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network_error",
            Self::Timeout => "timeout_error",
            Self::Http => "http_error",
            Self::Server => "server_error",
            Self::RateLimit => "rate_limit_error",
            Self::Authentication => "authentication_error",
            Self::Validation => "validation_error",
            Self::Unknown => "unknown_error",
        }
    }

    /// Classify an HTTP status code outside the 2xx range.
    #[must_use]
    pub fn from_status(code: u16) -> Self {
        match code {
            429 => Self::RateLimit,
            401 | 403 => Self::Authentication,
            400..=499 => Self::Http,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in a delivery's retry history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    /// HTTP status of the response, or 0 when no response was received.
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeliveryErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub response_time_ms: u64,
}

/// The audit record for one event delivered to one subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    /// Doubles as the wire `delivery_id`; stable across retries.
    pub id: Uuid,
    /// Id of the emitted business event; shared by the logs of all
    /// subscriptions the event fanned out to.
    pub event_id: Uuid,
    pub subscription_id: Uuid,
    pub event_type: EventType,
    pub event_timestamp: DateTime<Utc>,
    /// Snapshot of the business payload at emission time.
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: DeliveryStatus,
    pub history: Vec<DeliveryAttempt>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryLog {
    /// Create a pending log for one event targeted at one subscription.
    #[must_use]
    pub fn for_event(subscription: &Subscription, event: &WebhookEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: event.event_id,
            subscription_id: subscription.id,
            event_type: event.event_type,
            event_timestamp: event.timestamp,
            payload: event.data.clone(),
            attempts: 0,
            max_attempts: subscription.retry_policy.max_retries.max(1),
            status: DeliveryStatus::Pending,
            history: Vec::new(),
            next_retry_at: None,
            last_error: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminality() {
        assert!(DeliveryStatus::Success.is_terminal());
        assert!(DeliveryStatus::Abandoned.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::InFlight.is_terminal());
        assert!(!DeliveryStatus::Retry.is_terminal());
    }

    #[test]
    fn error_kind_from_status() {
        assert_eq!(DeliveryErrorKind::from_status(429), DeliveryErrorKind::RateLimit);
        assert_eq!(
            DeliveryErrorKind::from_status(401),
            DeliveryErrorKind::Authentication
        );
        assert_eq!(
            DeliveryErrorKind::from_status(403),
            DeliveryErrorKind::Authentication
        );
        assert_eq!(DeliveryErrorKind::from_status(404), DeliveryErrorKind::Http);
        assert_eq!(DeliveryErrorKind::from_status(503), DeliveryErrorKind::Server);
        assert_eq!(DeliveryErrorKind::from_status(0), DeliveryErrorKind::Unknown);
    }

    #[test]
    fn error_kind_wire_strings() {
        let json = serde_json::to_string(&DeliveryErrorKind::Timeout).unwrap();
        assert_eq!(json, "\"timeout_error\"");
        assert_eq!(DeliveryErrorKind::Network.as_str(), "network_error");
    }

    #[test]
    fn log_for_event_starts_pending() {
        let sub = Subscription::new(
            Uuid::new_v4(),
            "https://example.com/hook",
            vec![EventType::OrderCreated],
            "whsec_test",
            Utc::now(),
        );
        let event = WebhookEvent::new(
            EventType::OrderCreated,
            serde_json::json!({"order_id": "ord_1"}),
            Utc::now(),
        );
        let log = DeliveryLog::for_event(&sub, &event, Utc::now());

        assert_eq!(log.status, DeliveryStatus::Pending);
        assert_eq!(log.attempts, 0);
        assert_eq!(log.max_attempts, sub.retry_policy.max_retries);
        assert_eq!(log.event_id, event.event_id);
        assert!(log.next_retry_at.is_none());
        assert!(log.history.is_empty());
    }
}
