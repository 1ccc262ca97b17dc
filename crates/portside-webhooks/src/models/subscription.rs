//! Webhook subscription model: endpoint, event set, retry and rate-limit
//! configuration, health counters, and delivery statistics.
//!
//! `health` and `stats` are mutated exclusively by the delivery engine;
//! everything else is owned by the subscription-management service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use portside_events::EventType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::SubscriptionFilters;

/// HTTP method used for callbacks. The set is closed: webhook deliveries
/// carry a body, so GET/DELETE are not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-subscription retry configuration.
///
/// `max_retries` is the total attempt budget for a delivery; the delay before
/// attempt `n + 1` is `base_delay_ms * backoff_multiplier^(n - 1)`, capped by
/// the engine-wide maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Hard deadline for a single HTTP attempt.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 60_000,
            backoff_multiplier: 5.0,
            timeout_ms: 10_000,
        }
    }
}

/// Per-subscription dispatch rate limits over trailing windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_minute: 60,
            per_hour: 1000,
        }
    }
}

/// Endpoint health, tracked by the delivery engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionHealth {
    pub consecutive_failures: u32,
    pub is_healthy: bool,
}

impl Default for SubscriptionHealth {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            is_healthy: true,
        }
    }
}

/// Aggregate delivery statistics for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct DeliveryStats {
    pub total_deliveries: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Running mean over all recorded attempts.
    pub avg_response_time_ms: f64,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl DeliveryStats {
    /// Fold one attempt outcome into the aggregates.
    pub fn record(&mut self, success: bool, response_time_ms: u64, at: DateTime<Utc>) {
        self.total_deliveries += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        let n = self.total_deliveries as f64;
        self.avg_response_time_ms += (response_time_ms as f64 - self.avg_response_time_ms) / n;
        self.last_delivery_at = Some(at);
    }
}

/// A registered callback endpoint plus its filter, retry, and rate-limit
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub url: String,
    pub method: HttpMethod,
    pub secret: String,
    pub events: Vec<EventType>,
    /// Extra headers sent with every delivery. May not override the
    /// protected `X-*` security headers, `Content-Type`, or `User-Agent`.
    pub headers: HashMap<String, String>,
    pub retry_policy: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub filters: SubscriptionFilters,
    pub active: bool,
    pub is_verified: bool,
    pub health: SubscriptionHealth,
    pub stats: DeliveryStats,
    pub disabled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create an active, unverified subscription with default policies.
    #[must_use]
    pub fn new(
        owner_id: Uuid,
        url: impl Into<String>,
        events: Vec<EventType>,
        secret: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            url: url.into(),
            method: HttpMethod::default(),
            secret: secret.into(),
            events,
            headers: HashMap::new(),
            retry_policy: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            filters: SubscriptionFilters::default(),
            active: true,
            is_verified: false,
            health: SubscriptionHealth::default(),
            stats: DeliveryStats::default(),
            disabled_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this subscription wants the given event type.
    #[must_use]
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}
