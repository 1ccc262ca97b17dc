//! Outbound webhook delivery engine for the Portside marketplace.
//!
//! Takes typed business events ([`portside_events::EventType`] plus a JSON
//! payload) and delivers them as HMAC-SHA256-signed HTTP callbacks to
//! registered endpoints, with exponential-backoff retries, per-endpoint
//! health tracking and auto-disable, trailing-window rate limiting, and a
//! full per-delivery audit trail.
//!
//! Event emission is fire-and-forget relative to the business transaction
//! that produced it: producers await only acceptance into a bounded dispatch
//! queue, never a delivery outcome.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod filter;
pub mod models;
pub mod ratelimit;
pub mod scheduler;
pub mod store;
pub mod subscriptions;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WebhookConfig;
pub use dispatcher::{Dispatcher, DispatcherHandle, EventEmitter, WebhookEvent};
pub use engine::{DeliveryEngine, VerificationOutcome};
pub use error::WebhookError;
pub use filter::SubscriptionFilters;
pub use models::delivery::{DeliveryAttempt, DeliveryErrorKind, DeliveryLog, DeliveryStatus};
pub use models::envelope::{Envelope, Environment, API_VERSION};
pub use models::subscription::{
    DeliveryStats, HttpMethod, RateLimitConfig, RetryPolicy, Subscription, SubscriptionHealth,
};
pub use ratelimit::{RateLimitDecision, RateLimiter};
pub use scheduler::{RetryScheduler, SchedulerHandle};
pub use store::memory::{InMemoryDeliveryStore, InMemorySubscriptionStore};
pub use store::{DeliveryLogQuery, DeliveryStore, StoreError, SubscriptionStore};
pub use subscriptions::{
    CreateSubscriptionRequest, SubscriptionService, UpdateSubscriptionRequest,
};
