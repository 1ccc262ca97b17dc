//! Pluggable repositories for subscriptions and delivery logs.
//!
//! The marketplace's document store owns persistence; the engine only sees
//! these traits. [`memory`] provides the reference implementation used by the
//! test suite and by embedded deployments.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portside_events::EventType;
use uuid::Uuid;

use crate::models::delivery::{DeliveryLog, DeliveryStatus};
use crate::models::subscription::Subscription;

/// Backend-agnostic store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("duplicate record")]
    Duplicate,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Filtered delivery-log listing, newest first.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLogQuery {
    pub subscription_id: Option<Uuid>,
    pub status: Option<DeliveryStatus>,
    pub event_type: Option<EventType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// 0 means no limit.
    pub limit: usize,
}

/// Repository for webhook subscriptions.
///
/// `record_attempt_outcome`, `disable`, `reset_health`, and `set_verified`
/// exist so the delivery engine (the single logical writer of `health` and
/// `stats`) can mutate those fields without racing configuration updates.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert(&self, subscription: Subscription) -> Result<(), StoreError>;

    /// Replace an existing subscription's configuration.
    ///
    /// Only configuration is written: the stored `health`, `stats`,
    /// `is_verified`, and `disabled_reason` are preserved, so a caller
    /// holding a pre-delivery snapshot cannot roll back what the engine
    /// recorded in the meantime. Those fields change only through the
    /// dedicated operations below.
    async fn update(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// Returns true if a record was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, StoreError>;

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Subscription>, StoreError>;

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<usize, StoreError>;

    /// All active subscriptions whose event set includes `event_type`.
    async fn find_active_by_event_type(
        &self,
        event_type: EventType,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Fold one attempt outcome into `stats` and `health`.
    ///
    /// On success the consecutive-failure counter resets; on failure it
    /// increments. Returns the updated counter.
    async fn record_attempt_outcome(
        &self,
        id: Uuid,
        success: bool,
        response_time_ms: u64,
        at: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Deactivate a subscription with a reason (auto-disable path).
    async fn disable(&self, id: Uuid, reason: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Zero the failure counter, clear the disable reason, and reactivate.
    async fn reset_health(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Mark the endpoint as verified.
    async fn set_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Repository for delivery logs.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn create(&self, log: DeliveryLog) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryLog>, StoreError>;

    /// Compare-and-advance claim for one delivery attempt.
    ///
    /// Succeeds only if the log is in `Pending` or `Retry` with exactly
    /// `expected_attempts` attempts recorded; atomically moves it to
    /// `InFlight`, increments `attempts`, and clears `next_retry_at`.
    /// Returns `None` when another path already claimed this attempt or the
    /// log is terminal.
    async fn claim(
        &self,
        id: Uuid,
        expected_attempts: u32,
    ) -> Result<Option<DeliveryLog>, StoreError>;

    /// Persist the outcome of an attempt (status, history, retry schedule).
    async fn record_outcome(&self, log: &DeliveryLog) -> Result<(), StoreError>;

    /// Logs in `Retry` whose `next_retry_at` has elapsed, oldest first.
    async fn find_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, StoreError>;

    /// Move a non-terminal log straight to `Abandoned`.
    async fn mark_abandoned(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Number of logs created for a subscription at or after `since`.
    /// Backs the trailing-window rate limiter.
    async fn count_created_since(
        &self,
        subscription_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn list(&self, query: &DeliveryLogQuery) -> Result<Vec<DeliveryLog>, StoreError>;
}
