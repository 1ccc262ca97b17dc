//! Subscription management service.
//!
//! The owner-facing CRUD layer (out of scope here) drives this API:
//! create/update/delete subscriptions, regenerate signing secrets, reset
//! health, query delivery logs and statistics, and trigger test deliveries
//! and endpoint verification.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::crypto;
use crate::engine::{DeliveryEngine, VerificationOutcome};
use crate::error::WebhookError;
use crate::filter::SubscriptionFilters;
use crate::models::delivery::DeliveryLog;
use crate::models::subscription::{
    DeliveryStats, HttpMethod, RateLimitConfig, RetryPolicy, Subscription,
};
use crate::store::{DeliveryLogQuery, DeliveryStore, SubscriptionStore};
use crate::validation;

/// Input for creating a subscription. Event types arrive as wire strings and
/// are validated against the closed taxonomy.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub owner_id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    /// Generated when not provided.
    pub secret: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<HashMap<String, String>>,
    pub retry_policy: Option<RetryPolicy>,
    pub rate_limit: Option<RateLimitConfig>,
    pub filters: Option<SubscriptionFilters>,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubscriptionRequest {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub method: Option<HttpMethod>,
    pub headers: Option<HashMap<String, String>>,
    pub retry_policy: Option<RetryPolicy>,
    pub rate_limit: Option<RateLimitConfig>,
    pub filters: Option<SubscriptionFilters>,
    pub active: Option<bool>,
}

/// Service for subscription operations and delivery auditing.
#[derive(Clone)]
pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    engine: DeliveryEngine,
    clock: Arc<dyn Clock>,
    config: Arc<WebhookConfig>,
}

impl SubscriptionService {
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        engine: DeliveryEngine,
        clock: Arc<dyn Clock>,
        config: Arc<WebhookConfig>,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            engine,
            clock,
            config,
        }
    }

    /// Create a new subscription after full validation.
    pub async fn create(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, WebhookError> {
        validation::validate_webhook_url(&request.url, self.config.allow_http)?;
        let events = validation::validate_event_types(&request.events)?;

        let retry_policy = request.retry_policy.unwrap_or_default();
        validation::validate_retry_policy(&retry_policy)?;
        let rate_limit = request.rate_limit.unwrap_or_default();
        validation::validate_rate_limit(&rate_limit)?;

        let count = self.subscriptions.count_by_owner(request.owner_id).await?;
        if count >= self.config.max_subscriptions_per_owner {
            return Err(WebhookError::SubscriptionLimitExceeded {
                limit: self.config.max_subscriptions_per_owner,
            });
        }

        let secret = match request.secret {
            Some(secret) if !secret.is_empty() => secret,
            _ => crypto::generate_secret(),
        };

        let now = self.clock.now();
        let mut subscription =
            Subscription::new(request.owner_id, request.url, events, secret, now);
        if let Some(method) = request.method {
            subscription.method = method;
        }
        if let Some(headers) = request.headers {
            subscription.headers = headers;
        }
        subscription.retry_policy = retry_policy;
        subscription.rate_limit = rate_limit;
        if let Some(filters) = request.filters {
            subscription.filters = filters;
        }

        self.subscriptions.insert(subscription.clone()).await?;
        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            events = subscription.events.len(),
            "Subscription created"
        );
        Ok(subscription)
    }

    /// Apply a partial update. Setting `active = true` on a previously
    /// disabled subscription performs the explicit health reset that
    /// re-enabling requires.
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateSubscriptionRequest,
    ) -> Result<Subscription, WebhookError> {
        let mut subscription = self
            .subscriptions
            .get(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        if let Some(ref url) = request.url {
            validation::validate_webhook_url(url, self.config.allow_http)?;
            subscription.url = url.clone();
        }
        if let Some(ref events) = request.events {
            subscription.events = validation::validate_event_types(events)?;
        }
        if let Some(method) = request.method {
            subscription.method = method;
        }
        if let Some(headers) = request.headers {
            subscription.headers = headers;
        }
        if let Some(retry_policy) = request.retry_policy {
            validation::validate_retry_policy(&retry_policy)?;
            subscription.retry_policy = retry_policy;
        }
        if let Some(rate_limit) = request.rate_limit {
            validation::validate_rate_limit(&rate_limit)?;
            subscription.rate_limit = rate_limit;
        }
        if let Some(filters) = request.filters {
            subscription.filters = filters;
        }

        let re_enabling = request.active == Some(true) && !subscription.active;
        if let Some(active) = request.active {
            subscription.active = active;
        }
        subscription.updated_at = self.clock.now();

        self.subscriptions.update(&subscription).await?;

        if re_enabling {
            self.subscriptions
                .reset_health(id, self.clock.now())
                .await?;
        }

        self.subscriptions
            .get(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), WebhookError> {
        if !self.subscriptions.delete(id).await? {
            return Err(WebhookError::SubscriptionNotFound);
        }
        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %id,
            "Subscription deleted"
        );
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Subscription, WebhookError> {
        self.subscriptions
            .get(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)
    }

    pub async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Subscription>, WebhookError> {
        Ok(self.subscriptions.list_by_owner(owner_id).await?)
    }

    /// Replace the signing secret and return the new value.
    pub async fn regenerate_secret(&self, id: Uuid) -> Result<String, WebhookError> {
        let mut subscription = self
            .subscriptions
            .get(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;
        let secret = crypto::generate_secret();
        subscription.secret = secret.clone();
        subscription.updated_at = self.clock.now();
        self.subscriptions.update(&subscription).await?;
        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %id,
            "Signing secret regenerated"
        );
        Ok(secret)
    }

    /// Explicit health reset: zeroes the failure counter, clears the disable
    /// reason, and reactivates the subscription.
    pub async fn reset_health(&self, id: Uuid) -> Result<Subscription, WebhookError> {
        if self.subscriptions.get(id).await?.is_none() {
            return Err(WebhookError::SubscriptionNotFound);
        }
        self.subscriptions
            .reset_health(id, self.clock.now())
            .await?;
        self.get(id).await
    }

    /// Delivery logs matching the given filters, newest first.
    pub async fn delivery_logs(
        &self,
        query: &DeliveryLogQuery,
    ) -> Result<Vec<DeliveryLog>, WebhookError> {
        Ok(self.deliveries.list(query).await?)
    }

    /// A single delivery log.
    pub async fn delivery_log(&self, id: Uuid) -> Result<DeliveryLog, WebhookError> {
        self.deliveries
            .get(id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound)
    }

    /// Aggregate delivery statistics for a subscription.
    pub async fn stats(&self, id: Uuid) -> Result<DeliveryStats, WebhookError> {
        Ok(self.get(id).await?.stats)
    }

    /// Trigger a test delivery through the full pipeline.
    pub async fn send_test(&self, id: Uuid) -> Result<DeliveryLog, WebhookError> {
        self.engine.send_test(id).await
    }

    /// Trigger an endpoint verification probe.
    pub async fn verify(&self, id: Uuid) -> Result<VerificationOutcome, WebhookError> {
        self.engine.verify_endpoint(id).await
    }
}
