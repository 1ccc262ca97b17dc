//! Error types for the webhook system.
//!
//! [`WebhookError`] covers the control plane (subscription management,
//! verification, queries). Delivery-time failures are deliberately *not*
//! errors: they are recorded on the [`crate::models::delivery::DeliveryLog`]
//! as [`crate::models::delivery::DeliveryErrorKind`] entries and never
//! propagate back to the event producer.

use crate::store::StoreError;
use portside_events::UnknownEventType;

/// Webhook system error variants.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("SSRF protection: {0}")]
    SsrfDetected(String),

    #[error(transparent)]
    UnknownEventType(#[from] UnknownEventType),

    #[error("subscription not found")]
    SubscriptionNotFound,

    #[error("delivery not found")]
    DeliveryNotFound,

    #[error("subscription limit ({limit}) reached for owner")]
    SubscriptionLimitExceeded { limit: usize },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}
