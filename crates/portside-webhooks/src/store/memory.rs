//! In-memory reference implementation of the store traits.
//!
//! A `tokio::sync::RwLock` over a hash map per store. The claim operation
//! holds the write lock across its read-check-write, which is what makes it
//! a true compare-and-advance against concurrent retry paths.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portside_events::EventType;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::delivery::{DeliveryLog, DeliveryStatus};
use crate::models::subscription::Subscription;
use crate::store::{DeliveryLogQuery, DeliveryStore, StoreError, SubscriptionStore};

/// In-memory subscription store.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    inner: RwLock<HashMap<Uuid, Subscription>>,
}

impl InMemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn insert(&self, subscription: Subscription) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        if map.contains_key(&subscription.id) {
            return Err(StoreError::Duplicate);
        }
        map.insert(subscription.id, subscription);
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        match map.get_mut(&subscription.id) {
            Some(existing) => {
                // The engine-owned fields stay authoritative: a configuration
                // update carrying a stale snapshot must not roll back health
                // or stats recorded by a concurrent delivery attempt.
                let health = existing.health;
                let stats = existing.stats;
                let is_verified = existing.is_verified;
                let disabled_reason = existing.disabled_reason.clone();
                *existing = subscription.clone();
                existing.health = health;
                existing.stats = stats;
                existing.is_verified = is_verified;
                existing.disabled_reason = disabled_reason;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.remove(&id).is_some())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Subscription>, StoreError> {
        let map = self.inner.read().await;
        let mut subs: Vec<_> = map
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<usize, StoreError> {
        let map = self.inner.read().await;
        Ok(map.values().filter(|s| s.owner_id == owner_id).count())
    }

    async fn find_active_by_event_type(
        &self,
        event_type: EventType,
    ) -> Result<Vec<Subscription>, StoreError> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .filter(|s| s.active && s.subscribes_to(event_type))
            .cloned()
            .collect())
    }

    async fn record_attempt_outcome(
        &self,
        id: Uuid,
        success: bool,
        response_time_ms: u64,
        at: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let mut map = self.inner.write().await;
        let sub = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        sub.stats.record(success, response_time_ms, at);
        if success {
            sub.health.consecutive_failures = 0;
            sub.health.is_healthy = true;
        } else {
            sub.health.consecutive_failures += 1;
        }
        sub.updated_at = at;
        Ok(sub.health.consecutive_failures)
    }

    async fn disable(&self, id: Uuid, reason: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let sub = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        sub.active = false;
        sub.health.is_healthy = false;
        sub.disabled_reason = Some(reason.to_string());
        sub.updated_at = at;
        Ok(())
    }

    async fn reset_health(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let sub = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        sub.health.consecutive_failures = 0;
        sub.health.is_healthy = true;
        sub.disabled_reason = None;
        sub.active = true;
        sub.updated_at = at;
        Ok(())
    }

    async fn set_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let sub = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        sub.is_verified = true;
        sub.updated_at = at;
        Ok(())
    }
}

/// In-memory delivery-log store.
#[derive(Default)]
pub struct InMemoryDeliveryStore {
    inner: RwLock<HashMap<Uuid, DeliveryLog>>,
}

impl InMemoryDeliveryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn create(&self, log: DeliveryLog) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        if map.contains_key(&log.id) {
            return Err(StoreError::Duplicate);
        }
        map.insert(log.id, log);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryLog>, StoreError> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn claim(
        &self,
        id: Uuid,
        expected_attempts: u32,
    ) -> Result<Option<DeliveryLog>, StoreError> {
        let mut map = self.inner.write().await;
        let log = map.get_mut(&id).ok_or(StoreError::NotFound)?;

        let claimable = matches!(log.status, DeliveryStatus::Pending | DeliveryStatus::Retry);
        if !claimable || log.attempts != expected_attempts {
            return Ok(None);
        }

        log.status = DeliveryStatus::InFlight;
        log.attempts += 1;
        log.next_retry_at = None;
        Ok(Some(log.clone()))
    }

    async fn record_outcome(&self, updated: &DeliveryLog) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        match map.get_mut(&updated.id) {
            Some(log) => {
                *log = updated.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn find_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, StoreError> {
        let map = self.inner.read().await;
        let mut due: Vec<_> = map
            .values()
            .filter(|l| {
                l.status == DeliveryStatus::Retry
                    && l.next_retry_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|l| l.next_retry_at);
        if limit > 0 {
            due.truncate(limit);
        }
        Ok(due)
    }

    async fn mark_abandoned(
        &self,
        id: Uuid,
        reason: &str,
        _at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let log = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        if log.status.is_terminal() {
            return Ok(());
        }
        log.status = DeliveryStatus::Abandoned;
        log.next_retry_at = None;
        log.last_error = Some(reason.to_string());
        Ok(())
    }

    async fn count_created_since(
        &self,
        subscription_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .filter(|l| l.subscription_id == subscription_id && l.created_at >= since)
            .count() as u64)
    }

    async fn list(&self, query: &DeliveryLogQuery) -> Result<Vec<DeliveryLog>, StoreError> {
        let map = self.inner.read().await;
        let mut logs: Vec<_> = map
            .values()
            .filter(|l| {
                query
                    .subscription_id
                    .is_none_or(|id| l.subscription_id == id)
                    && query.status.is_none_or(|s| l.status == s)
                    && query.event_type.is_none_or(|t| l.event_type == t)
                    && query.since.is_none_or(|t| l.created_at >= t)
                    && query.until.is_none_or(|t| l.created_at <= t)
            })
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if query.limit > 0 {
            logs.truncate(query.limit);
        }
        Ok(logs)
    }
}
