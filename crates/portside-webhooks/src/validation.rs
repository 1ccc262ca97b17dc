//! Subscription configuration validation.
//!
//! URL/scheme checks with SSRF protection, event-type validation against the
//! closed taxonomy, and bounds checks for retry and rate-limit policies.
//! Everything here runs at subscription create/update time; a subscription
//! that passes is safe for the delivery engine to act on.

use std::net::IpAddr;

use portside_events::EventType;

use crate::error::WebhookError;
use crate::models::subscription::{RateLimitConfig, RetryPolicy};

/// Bounds for retry policies.
const MAX_RETRIES_CAP: u32 = 10;
const MIN_BASE_DELAY_MS: u64 = 100;
const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 120_000;
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Validate a webhook delivery URL.
///
/// Checks:
/// 1. URL is parseable
/// 2. Scheme is HTTPS (or HTTP if `allow_http` is set for dev/test)
/// 3. Host is not a private/internal address (SSRF protection)
pub fn validate_webhook_url(url: &str, allow_http: bool) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(
                "webhook URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::InvalidUrl("URL must have a host".to_string()))?;

    validate_host_not_internal(host)
}

/// Validate that a host is not a private/internal address.
///
/// Blocks loopback, private networks, link-local (cloud metadata), CGNAT,
/// IPv6 loopback/unspecified/unique-local, and common internal hostnames.
pub fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(WebhookError::SsrfDetected(format!(
                "destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(WebhookError::SsrfDetected(format!(
            "destination host {host} is an internal hostname"
        )));
    }

    Ok(())
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                // CGNAT 100.64.0.0/10
                || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique-local fc00::/7
                || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

/// Parse and validate a set of event-type strings.
///
/// Unknown event types are rejected at subscription-creation time; the set
/// must be non-empty.
pub fn validate_event_types(event_types: &[String]) -> Result<Vec<EventType>, WebhookError> {
    if event_types.is_empty() {
        return Err(WebhookError::Validation(
            "at least one event type is required".to_string(),
        ));
    }
    event_types
        .iter()
        .map(|s| EventType::parse(s).map_err(WebhookError::from))
        .collect()
}

/// Bounds-check a retry policy.
pub fn validate_retry_policy(policy: &RetryPolicy) -> Result<(), WebhookError> {
    if policy.max_retries == 0 || policy.max_retries > MAX_RETRIES_CAP {
        return Err(WebhookError::Validation(format!(
            "max_retries must be between 1 and {MAX_RETRIES_CAP}"
        )));
    }
    if policy.base_delay_ms < MIN_BASE_DELAY_MS {
        return Err(WebhookError::Validation(format!(
            "base_delay_ms must be at least {MIN_BASE_DELAY_MS}"
        )));
    }
    if policy.backoff_multiplier < 1.0 || policy.backoff_multiplier > MAX_BACKOFF_MULTIPLIER {
        return Err(WebhookError::Validation(format!(
            "backoff_multiplier must be between 1.0 and {MAX_BACKOFF_MULTIPLIER}"
        )));
    }
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&policy.timeout_ms) {
        return Err(WebhookError::Validation(format!(
            "timeout_ms must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"
        )));
    }
    Ok(())
}

/// Bounds-check a rate-limit config.
pub fn validate_rate_limit(limits: &RateLimitConfig) -> Result<(), WebhookError> {
    if !limits.enabled {
        return Ok(());
    }
    if limits.per_minute == 0 || limits.per_hour == 0 {
        return Err(WebhookError::Validation(
            "rate limits must be positive when enabled".to_string(),
        ));
    }
    if limits.per_hour < limits.per_minute {
        return Err(WebhookError::Validation(
            "per_hour limit cannot be lower than per_minute limit".to_string(),
        ));
    }
    Ok(())
}
