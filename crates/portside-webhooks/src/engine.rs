//! Delivery engine: claim-then-attempt execution of webhook callbacks.
//!
//! Each attempt starts with a compare-and-advance claim on the delivery log,
//! which serializes the redundant retry paths (in-process timer and periodic
//! sweep) onto a single winner. The winner builds the signed envelope, makes
//! the HTTP call under the subscription's timeout, classifies the outcome,
//! appends to the retry history, updates subscription health and statistics,
//! and schedules the next retry if the attempt budget allows.

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::json;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::crypto;
use crate::error::WebhookError;
use crate::models::delivery::{
    DeliveryAttempt, DeliveryErrorKind, DeliveryLog, DeliveryStatus,
};
use crate::models::envelope::Envelope;
use crate::models::subscription::{HttpMethod, RetryPolicy, Subscription};
use crate::store::{DeliveryStore, SubscriptionStore};
use portside_events::EventType;

/// Headers the engine owns; subscriber-supplied headers may not override them.
const PROTECTED_HEADERS: &[&str] = &[
    "content-type",
    "user-agent",
    "x-event",
    "x-delivery-id",
    "x-webhook-id",
    "x-signature",
    "x-signature-algorithm",
];

/// Result of an endpoint verification probe.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub verified: bool,
    /// Whether the response body echoed the probe challenge (the stronger
    /// confirmation).
    pub challenge_echoed: bool,
    pub status_code: u16,
    pub error: Option<String>,
}

/// Classified result of one HTTP attempt.
struct AttemptOutcome {
    /// HTTP status, or 0 when no response was received.
    status_code: u16,
    error: Option<(DeliveryErrorKind, String)>,
    response_time_ms: u64,
}

/// Executes delivery attempts against subscription endpoints.
#[derive(Clone)]
pub struct DeliveryEngine {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    clock: Arc<dyn Clock>,
    config: Arc<WebhookConfig>,
    client: Client,
}

impl DeliveryEngine {
    /// Create an engine with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        clock: Arc<dyn Clock>,
        config: Arc<WebhookConfig>,
    ) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            subscriptions,
            deliveries,
            clock,
            config,
            client,
        })
    }

    /// Run one guarded delivery attempt for a log observed in the given
    /// state. Loses silently if another path already claimed this attempt.
    pub async fn attempt(&self, log: &DeliveryLog) {
        let claimed = match self.deliveries.claim(log.id, log.attempts).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                tracing::debug!(
                    target: "webhook_delivery",
                    delivery_id = %log.id,
                    "Attempt already claimed or log is terminal"
                );
                return;
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %log.id,
                    error = %e,
                    "Failed to claim delivery attempt"
                );
                return;
            }
        };

        let subscription = match self.subscriptions.get(claimed.subscription_id).await {
            Ok(Some(sub)) if sub.active => sub,
            Ok(Some(_)) => {
                self.abandon(&claimed, "subscription disabled").await;
                return;
            }
            Ok(None) => {
                self.abandon(&claimed, "subscription deleted").await;
                return;
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %claimed.id,
                    error = %e,
                    "Failed to load subscription for attempt"
                );
                return;
            }
        };

        let envelope = Envelope::new(
            claimed.event_type,
            self.clock.now(),
            subscription.id,
            claimed.id,
            self.config.environment,
            claimed.payload.clone(),
        );
        let outcome = self.send_envelope(&subscription, &envelope).await;
        self.record_outcome(claimed, &subscription, outcome).await;
    }

    /// Serialize, sign, and send one envelope; classify what came back.
    async fn send_envelope(&self, subscription: &Subscription, envelope: &Envelope) -> AttemptOutcome {
        let body = match serde_json::to_vec(envelope) {
            Ok(b) => b,
            Err(e) => {
                return AttemptOutcome {
                    status_code: 0,
                    error: Some((
                        DeliveryErrorKind::Unknown,
                        format!("failed to serialize envelope: {e}"),
                    )),
                    response_time_ms: 0,
                };
            }
        };

        let headers = match self.build_headers(subscription, envelope, &body) {
            Ok(h) => h,
            Err(message) => {
                return AttemptOutcome {
                    status_code: 0,
                    error: Some((DeliveryErrorKind::Validation, message)),
                    response_time_ms: 0,
                };
            }
        };

        let timeout = std::time::Duration::from_millis(subscription.retry_policy.timeout_ms);
        let start = Instant::now();
        let result = self
            .client
            .request(request_method(subscription.method), &subscription.url)
            .headers(headers)
            .timeout(timeout)
            .body(body)
            .send()
            .await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                if (200..300).contains(&status_code) {
                    AttemptOutcome {
                        status_code,
                        error: None,
                        response_time_ms,
                    }
                } else {
                    AttemptOutcome {
                        status_code,
                        error: Some((
                            DeliveryErrorKind::from_status(status_code),
                            format!("HTTP {status_code}"),
                        )),
                        response_time_ms,
                    }
                }
            }
            Err(e) => AttemptOutcome {
                status_code: 0,
                error: Some(classify_transport_error(&e, subscription.retry_policy.timeout_ms)),
                response_time_ms,
            },
        }
    }

    /// Header set for one delivery: the protected engine headers plus the
    /// subscriber's extras. Subscriber headers that collide with a protected
    /// name are dropped; an unparseable subscriber header fails the attempt
    /// as a configuration error.
    fn build_headers(
        &self,
        subscription: &Subscription,
        envelope: &Envelope,
        body: &[u8],
    ) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        if let Ok(v) = HeaderValue::from_str(envelope.event.as_str()) {
            headers.insert("X-Event", v);
        }
        if let Ok(v) = HeaderValue::from_str(&envelope.delivery_id.to_string()) {
            headers.insert("X-Delivery-Id", v);
        }
        if let Ok(v) = HeaderValue::from_str(&envelope.webhook_id.to_string()) {
            headers.insert("X-Webhook-Id", v);
        }
        if let Ok(v) = HeaderValue::from_str(&crypto::signature_header(&subscription.secret, body)) {
            headers.insert("X-Signature", v);
        }
        headers.insert("X-Signature-Algorithm", HeaderValue::from_static("sha256"));

        for (name, value) in &subscription.headers {
            let lower = name.to_ascii_lowercase();
            if PROTECTED_HEADERS.contains(&lower.as_str()) {
                tracing::debug!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    header = %name,
                    "Ignoring subscriber header that collides with a protected header"
                );
                continue;
            }
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid custom header name: {name}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for custom header: {name}"))?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }

    /// Apply one attempt outcome: history entry, status transition, retry
    /// scheduling, subscription stats/health, and auto-disable.
    async fn record_outcome(
        &self,
        mut log: DeliveryLog,
        subscription: &Subscription,
        outcome: AttemptOutcome,
    ) {
        let now = self.clock.now();
        let attempt_number = log.attempts;
        let success = outcome.error.is_none();
        let (error_kind, error_message) = match outcome.error {
            Some((kind, message)) => (Some(kind), Some(message)),
            None => (None, None),
        };

        log.history.push(DeliveryAttempt {
            attempt: attempt_number,
            timestamp: now,
            status_code: outcome.status_code,
            error: error_kind,
            error_message: error_message.clone(),
            response_time_ms: outcome.response_time_ms,
        });

        if success {
            log.status = DeliveryStatus::Success;
            log.next_retry_at = None;
            log.last_error = None;
            tracing::info!(
                target: "webhook_delivery",
                delivery_id = %log.id,
                subscription_id = %subscription.id,
                event_id = %log.event_id,
                event_type = %log.event_type,
                status_code = outcome.status_code,
                response_time_ms = outcome.response_time_ms,
                attempt = attempt_number,
                "Webhook delivery succeeded"
            );
        } else if attempt_number < log.max_attempts {
            let delay_ms = retry_delay_ms(
                &subscription.retry_policy,
                attempt_number,
                self.config.max_retry_delay_ms,
            );
            log.status = DeliveryStatus::Retry;
            // Saturate rather than wrap: a cap above i64::MAX milliseconds
            // must not turn into a deadline in the past.
            let delay =
                chrono::Duration::milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX));
            log.next_retry_at = Some(
                now.checked_add_signed(delay)
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC),
            );
            log.last_error = error_message.clone();
            tracing::warn!(
                target: "webhook_delivery",
                delivery_id = %log.id,
                subscription_id = %subscription.id,
                event_type = %log.event_type,
                error = error_message.as_deref().unwrap_or("unknown"),
                attempt = attempt_number,
                retry_in_ms = delay_ms,
                "Webhook delivery failed — retry scheduled"
            );
        } else {
            log.status = DeliveryStatus::Abandoned;
            log.next_retry_at = None;
            log.last_error = error_message.clone();
            tracing::warn!(
                target: "webhook_delivery",
                delivery_id = %log.id,
                subscription_id = %subscription.id,
                event_type = %log.event_type,
                error = error_message.as_deref().unwrap_or("unknown"),
                attempts = attempt_number,
                "Webhook delivery abandoned — attempt budget exhausted"
            );
        }

        if let Err(e) = self.deliveries.record_outcome(&log).await {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %log.id,
                error = %e,
                "Failed to persist delivery outcome"
            );
        }

        match self
            .subscriptions
            .record_attempt_outcome(subscription.id, success, outcome.response_time_ms, now)
            .await
        {
            Ok(consecutive_failures) => {
                if !success && consecutive_failures >= self.config.auto_disable_threshold {
                    self.auto_disable(subscription, consecutive_failures, now).await;
                }
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to update subscription health"
                );
            }
        }

        if log.status == DeliveryStatus::Retry && self.config.arm_retry_timers {
            self.arm_retry_timer(log, now);
        }
    }

    /// Arm an in-process timer for a scheduled retry. The periodic sweep
    /// remains the durability backstop; the claim guard resolves the race
    /// when both fire.
    fn arm_retry_timer(&self, log: DeliveryLog, now: chrono::DateTime<chrono::Utc>) {
        let Some(next_retry_at) = log.next_retry_at else {
            return;
        };
        let delay = (next_retry_at - now).to_std().unwrap_or_default();
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.attempt(&log).await;
        });
    }

    async fn auto_disable(&self, subscription: &Subscription, failures: u32, now: chrono::DateTime<chrono::Utc>) {
        let reason = format!("auto-disabled after {failures} consecutive delivery failures");
        tracing::warn!(
            target: "webhook_delivery",
            subscription_id = %subscription.id,
            consecutive_failures = failures,
            threshold = self.config.auto_disable_threshold,
            "Auto-disabling subscription"
        );
        if let Err(e) = self.subscriptions.disable(subscription.id, &reason, now).await {
            tracing::error!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                error = %e,
                "Failed to auto-disable subscription"
            );
        }
    }

    async fn abandon(&self, log: &DeliveryLog, reason: &str) {
        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %log.id,
            subscription_id = %log.subscription_id,
            reason,
            "Abandoning delivery"
        );
        if let Err(e) = self
            .deliveries
            .mark_abandoned(log.id, reason, self.clock.now())
            .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %log.id,
                error = %e,
                "Failed to abandon delivery"
            );
        }
    }

    /// Send a `webhook.verification` probe carrying a random challenge.
    ///
    /// A 2xx response marks the endpoint verified and resets its health; a
    /// response body echoing the challenge is recorded as the stronger
    /// confirmation. No delivery log is created for probes.
    pub async fn verify_endpoint(&self, subscription_id: Uuid) -> Result<VerificationOutcome, WebhookError> {
        let subscription = self
            .subscriptions
            .get(subscription_id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        let challenge = crypto::generate_challenge();
        let envelope = Envelope::new(
            EventType::WebhookVerification,
            self.clock.now(),
            subscription.id,
            Uuid::new_v4(),
            self.config.environment,
            json!({ "challenge": challenge }),
        );

        let body = serde_json::to_vec(&envelope)
            .map_err(|e| WebhookError::Internal(format!("failed to serialize probe: {e}")))?;
        let headers = self
            .build_headers(&subscription, &envelope, &body)
            .map_err(WebhookError::Validation)?;

        let timeout = std::time::Duration::from_millis(subscription.retry_policy.timeout_ms);
        let result = self
            .client
            .request(request_method(subscription.method), &subscription.url)
            .headers(headers)
            .timeout(timeout)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                if (200..300).contains(&status_code) {
                    let response_body = response.text().await.unwrap_or_default();
                    let challenge_echoed = response_body.contains(&challenge);

                    let now = self.clock.now();
                    self.subscriptions.set_verified(subscription.id, now).await?;
                    self.subscriptions.reset_health(subscription.id, now).await?;

                    tracing::info!(
                        target: "webhook_delivery",
                        subscription_id = %subscription.id,
                        status_code,
                        challenge_echoed,
                        "Endpoint verification succeeded"
                    );
                    Ok(VerificationOutcome {
                        verified: true,
                        challenge_echoed,
                        status_code,
                        error: None,
                    })
                } else {
                    Ok(VerificationOutcome {
                        verified: false,
                        challenge_echoed: false,
                        status_code,
                        error: Some(format!("HTTP {status_code}")),
                    })
                }
            }
            Err(e) => {
                let (_, message) =
                    classify_transport_error(&e, subscription.retry_policy.timeout_ms);
                Ok(VerificationOutcome {
                    verified: false,
                    challenge_echoed: false,
                    status_code: 0,
                    error: Some(message),
                })
            }
        }
    }

    /// Trigger a test delivery through the full attempt pipeline and return
    /// the resulting log.
    pub async fn send_test(&self, subscription_id: Uuid) -> Result<DeliveryLog, WebhookError> {
        let subscription = self
            .subscriptions
            .get(subscription_id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;
        if !subscription.active {
            return Err(WebhookError::Validation(
                "cannot send a test delivery to a disabled subscription".to_string(),
            ));
        }

        let now = self.clock.now();
        let event = crate::dispatcher::WebhookEvent::new(
            EventType::WebhookVerification,
            json!({ "test": true }),
            now,
        );
        let log = DeliveryLog::for_event(&subscription, &event, now);
        let log_id = log.id;
        self.deliveries.create(log.clone()).await?;

        self.attempt(&log).await;

        self.deliveries
            .get(log_id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound)
    }
}

/// Backoff delay before the attempt after `attempt_number` failed:
/// `base * multiplier^(attempt_number - 1)`, capped.
#[must_use]
pub fn retry_delay_ms(policy: &RetryPolicy, attempt_number: u32, cap_ms: u64) -> u64 {
    let exponent = attempt_number.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = policy.base_delay_ms as f64 * policy.backoff_multiplier.powi(exponent);
    if !raw.is_finite() {
        return cap_ms;
    }
    (raw as u64).min(cap_ms)
}

fn request_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
    }
}

fn classify_transport_error(e: &reqwest::Error, timeout_ms: u64) -> (DeliveryErrorKind, String) {
    if e.is_timeout() {
        (
            DeliveryErrorKind::Timeout,
            format!("request timed out after {timeout_ms}ms"),
        )
    } else if e.is_connect() {
        (DeliveryErrorKind::Network, format!("connection failed: {e}"))
    } else if e.is_builder() || e.is_request() {
        (
            DeliveryErrorKind::Validation,
            format!("request could not be built: {e}"),
        )
    } else {
        (DeliveryErrorKind::Unknown, format!("request error: {e}"))
    }
}
