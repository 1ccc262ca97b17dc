//! Trailing-window dispatch rate limiting.
//!
//! Counts delivery logs created for a subscription within the trailing
//! 60-second and 3600-second windows. A dispatch that would exceed either cap
//! is suppressed at that point in time: no log row is created and nothing is
//! queued for later.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::models::subscription::Subscription;
use crate::store::{DeliveryStore, StoreError};

const MINUTE_WINDOW_SECS: i64 = 60;
const HOUR_WINDOW_SECS: i64 = 3600;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    /// The trailing 60s window is at its cap.
    LimitedPerMinute,
    /// The trailing 3600s window is at its cap.
    LimitedPerHour,
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Advisory per-subscription backpressure over the delivery-log store.
#[derive(Clone)]
pub struct RateLimiter {
    logs: Arc<dyn DeliveryStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(logs: Arc<dyn DeliveryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { logs, clock }
    }

    /// Check whether a dispatch to this subscription may proceed right now.
    pub async fn check(&self, subscription: &Subscription) -> Result<RateLimitDecision, StoreError> {
        let limits = &subscription.rate_limit;
        if !limits.enabled {
            return Ok(RateLimitDecision::Allowed);
        }

        let now = self.clock.now();

        let minute_count = self
            .logs
            .count_created_since(subscription.id, now - Duration::seconds(MINUTE_WINDOW_SECS))
            .await?;
        if minute_count >= u64::from(limits.per_minute) {
            return Ok(RateLimitDecision::LimitedPerMinute);
        }

        let hour_count = self
            .logs
            .count_created_since(subscription.id, now - Duration::seconds(HOUR_WINDOW_SECS))
            .await?;
        if hour_count >= u64::from(limits.per_hour) {
            return Ok(RateLimitDecision::LimitedPerHour);
        }

        Ok(RateLimitDecision::Allowed)
    }
}
