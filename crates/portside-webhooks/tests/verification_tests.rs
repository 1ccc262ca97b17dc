//! Integration tests for endpoint verification probes and manual test
//! deliveries.

mod common;

use common::*;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer};

use portside_events::EventType;
use portside_webhooks::{Clock, DeliveryStatus, DeliveryStore, WebhookError};

#[tokio::test]
async fn echoing_endpoint_verifies_with_challenge() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(EchoResponder)
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new();
    let mut sub = subscription_to(
        format!("{}/hook", mock_server.uri()),
        vec![EventType::OrderCreated],
    );
    sub.health.consecutive_failures = 4;
    let sub = harness.add_subscription(sub).await;

    let outcome = harness.engine.verify_endpoint(sub.id).await.unwrap();
    assert!(outcome.verified);
    assert!(outcome.challenge_echoed);
    assert_eq!(outcome.status_code, 200);
    assert!(outcome.error.is_none());

    let sub = harness.subscription(sub.id).await;
    assert!(sub.is_verified);
    // Verification also resets endpoint health.
    assert_eq!(sub.health.consecutive_failures, 0);
    assert!(sub.health.is_healthy);
}

#[tokio::test]
async fn two_hundred_without_echo_still_verifies() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new();
    let sub = harness
        .add_subscription(subscription_to(
            format!("{}/hook", mock_server.uri()),
            vec![EventType::OrderCreated],
        ))
        .await;

    let outcome = harness.engine.verify_endpoint(sub.id).await.unwrap();
    assert!(outcome.verified);
    assert!(!outcome.challenge_echoed);

    // The probe is a webhook.verification envelope carrying a challenge.
    let body = capture.requests()[0].body_json();
    assert_eq!(body["event"], "webhook.verification");
    assert!(body["data"]["challenge"].is_string());

    assert!(harness.subscription(sub.id).await.is_verified);
}

#[tokio::test]
async fn failing_probe_leaves_endpoint_unverified() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CountingResponder::with_status(404))
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new();
    let sub = harness
        .add_subscription(subscription_to(
            format!("{}/hook", mock_server.uri()),
            vec![EventType::OrderCreated],
        ))
        .await;

    let outcome = harness.engine.verify_endpoint(sub.id).await.unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.status_code, 404);
    assert_eq!(outcome.error.as_deref(), Some("HTTP 404"));
    assert!(!harness.subscription(sub.id).await.is_verified);
}

#[tokio::test]
async fn unreachable_probe_reports_transport_error() {
    let harness = TestHarness::new();
    let sub = harness
        .add_subscription(subscription_to(
            "http://127.0.0.1:9/hook",
            vec![EventType::OrderCreated],
        ))
        .await;

    let outcome = harness.engine.verify_endpoint(sub.id).await.unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.status_code, 0);
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn probes_leave_no_delivery_log() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::new())
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new();
    let sub = harness
        .add_subscription(subscription_to(
            format!("{}/hook", mock_server.uri()),
            vec![EventType::OrderCreated],
        ))
        .await;

    harness.engine.verify_endpoint(sub.id).await.unwrap();

    let logs = harness
        .deliveries
        .list(&Default::default())
        .await
        .unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn send_test_runs_the_full_pipeline() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new();
    let sub = harness
        .add_subscription(subscription_to(
            format!("{}/hook", mock_server.uri()),
            vec![EventType::OrderCreated],
        ))
        .await;

    let log = harness.engine.send_test(sub.id).await.unwrap();
    assert_eq!(log.status, DeliveryStatus::Success);
    assert_eq!(log.event_type, EventType::WebhookVerification);
    assert_eq!(log.attempts, 1);

    let request = &capture.requests()[0];
    assert_eq!(request.body_json()["data"]["test"], true);
    assert!(verify_captured_signature(request, SECRET_1));
}

#[tokio::test]
async fn send_test_rejects_disabled_subscriptions() {
    let harness = TestHarness::new();
    let mut sub = subscription_to("https://example.com/hook", vec![EventType::OrderCreated]);
    sub.active = false;
    let sub = harness.add_subscription(sub).await;

    let err = harness.engine.send_test(sub.id).await.unwrap_err();
    assert!(matches!(err, WebhookError::Validation(_)));
}

#[tokio::test]
async fn verify_unknown_subscription_errors() {
    let harness = TestHarness::new();
    let err = harness
        .engine
        .verify_endpoint(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::SubscriptionNotFound));
}
