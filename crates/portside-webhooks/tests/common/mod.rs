//! Common test utilities for portside-webhooks integration tests.
//!
//! Provides mock responders, a full in-memory delivery harness, and fixture
//! helpers for exercising the pipeline without a real backing store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use portside_events::EventType;
use portside_webhooks::{
    crypto, Clock, DeliveryEngine, DeliveryLog, DeliveryStatus, DeliveryStore, Dispatcher,
    InMemoryDeliveryStore, InMemorySubscriptionStore, ManualClock, RetryPolicy, RetryScheduler,
    Subscription, SubscriptionStore, WebhookConfig, WebhookEvent,
};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Standard test owner IDs
pub const OWNER_A: Uuid = Uuid::from_bytes([
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

pub const OWNER_B: Uuid = Uuid::from_bytes([
    0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
]);

/// Standard test signing secret
pub const SECRET_1: &str = "whsec_test_secret_key_12345";

/// A retry policy with delays short enough for tests.
pub fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay_ms: 1_000,
        backoff_multiplier: 2.0,
        timeout_ms: 5_000,
    }
}

/// A subscription pointed at a mock server endpoint.
pub fn subscription_to(url: impl Into<String>, events: Vec<EventType>) -> Subscription {
    let mut sub = Subscription::new(OWNER_A, url, events, SECRET_1, Utc::now());
    sub.retry_policy = fast_policy(3);
    sub
}

/// An order.created event with a typical marketplace payload.
pub fn order_created_event(at: DateTime<Utc>) -> WebhookEvent {
    WebhookEvent::new(
        EventType::OrderCreated,
        json!({
            "order_id": "ord_123",
            "order_status": "confirmed",
            "order_value": 2500.0,
            "shipping_country": "DE",
            "payment_type": "advance"
        }),
        at,
    )
}

// ---------------------------------------------------------------------------
// TestHarness - in-memory stores + engine wired together
// ---------------------------------------------------------------------------

/// The delivery pipeline over in-memory stores and a manual clock.
pub struct TestHarness {
    pub subscriptions: Arc<InMemorySubscriptionStore>,
    pub deliveries: Arc<InMemoryDeliveryStore>,
    pub clock: Arc<ManualClock>,
    pub config: Arc<WebhookConfig>,
    pub engine: DeliveryEngine,
}

impl TestHarness {
    /// Build a harness with the given config.
    pub fn with_config(config: WebhookConfig) -> Self {
        let subscriptions = Arc::new(InMemorySubscriptionStore::new());
        let deliveries = Arc::new(InMemoryDeliveryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = Arc::new(config);
        let engine = DeliveryEngine::new(
            subscriptions.clone(),
            deliveries.clone(),
            clock.clone(),
            config.clone(),
        )
        .expect("failed to build delivery engine");
        Self {
            subscriptions,
            deliveries,
            clock,
            config,
            engine,
        }
    }

    /// Harness with in-process retry timers disabled, so retries only fire
    /// through explicit scheduler sweeps.
    pub fn new() -> Self {
        Self::with_config(WebhookConfig::default().with_arm_retry_timers(false))
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.subscriptions.clone(),
            self.deliveries.clone(),
            self.engine.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    pub fn scheduler(&self) -> RetryScheduler {
        RetryScheduler::new(
            self.subscriptions.clone(),
            self.deliveries.clone(),
            self.engine.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    /// Insert a subscription and return it.
    pub async fn add_subscription(&self, sub: Subscription) -> Subscription {
        self.subscriptions
            .insert(sub.clone())
            .await
            .expect("failed to insert subscription");
        sub
    }

    /// Create a pending delivery log for an event against a subscription.
    pub async fn add_delivery(&self, sub: &Subscription, event: &WebhookEvent) -> DeliveryLog {
        let log = DeliveryLog::for_event(sub, event, self.clock.now());
        self.deliveries
            .create(log.clone())
            .await
            .expect("failed to create delivery log");
        log
    }

    /// Advance the manual clock past the log's retry deadline and run one
    /// scheduler sweep.
    pub async fn sweep_past_deadline(&self, log_id: Uuid) {
        let log = self
            .deliveries
            .get(log_id)
            .await
            .unwrap()
            .expect("delivery log missing");
        if let Some(at) = log.next_retry_at {
            let now = self.clock.now();
            if at > now {
                self.clock.advance(at - now + chrono::Duration::seconds(1));
            }
        }
        self.scheduler().sweep().await;
    }

    pub async fn delivery(&self, id: Uuid) -> DeliveryLog {
        self.deliveries
            .get(id)
            .await
            .unwrap()
            .expect("delivery log missing")
    }

    pub async fn subscription(&self, id: Uuid) -> Subscription {
        self.subscriptions
            .get(id)
            .await
            .unwrap()
            .expect("subscription missing")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll the store until the delivery log reaches the given status.
///
/// Needed when the attempt runs on a spawned task (dispatch fan-out, armed
/// retry timers) rather than being awaited directly.
pub async fn wait_for_status(harness: &TestHarness, id: Uuid, status: DeliveryStatus) -> DeliveryLog {
    for _ in 0..200 {
        let log = harness.delivery(id).await;
        if log.status == status {
            return log;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("delivery {id} never reached status {status}");
}

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not valid JSON")
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

/// Verify the `X-Signature` header of a captured request against its body.
pub fn verify_captured_signature(request: &CapturedRequest, secret: &str) -> bool {
    match request.header("x-signature") {
        Some(header) => crypto::verify(header, secret, &request.body),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// CountingResponder - counts requests
// ---------------------------------------------------------------------------

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    /// Create a new counting responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a counting responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    /// Get the current request count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a specified number of times before
/// succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 500, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self::fail_with_status(n, 500)
    }

    /// Create a responder that fails with a custom status code.
    pub fn fail_with_status(n: u32, failure_code: u16) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code,
        }
    }

    /// Get the current attempt count.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

// ---------------------------------------------------------------------------
// DelayedResponder - adds response delay
// ---------------------------------------------------------------------------

/// A wiremock responder that adds a delay before responding.
#[derive(Clone)]
pub struct DelayedResponder {
    delay_ms: u64,
}

impl DelayedResponder {
    /// Create a responder that delays for `ms` milliseconds before a 200.
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_delay(Duration::from_millis(self.delay_ms))
    }
}

// ---------------------------------------------------------------------------
// EchoResponder - returns the request body, for verification probes
// ---------------------------------------------------------------------------

/// A wiremock responder that echoes the request body back with a 200.
#[derive(Clone)]
pub struct EchoResponder;

impl Respond for EchoResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_bytes(request.body.clone())
    }
}
