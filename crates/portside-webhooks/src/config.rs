//! Engine-wide configuration.

use std::time::Duration;

use crate::models::envelope::Environment;

/// Tunables shared by the dispatcher, engine, and scheduler.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Environment tag carried in every envelope.
    pub environment: Environment,
    /// `User-Agent` sent with every delivery.
    pub user_agent: String,
    /// Consecutive failures before a subscription is auto-disabled.
    pub auto_disable_threshold: u32,
    /// Upper bound on the exponential backoff delay.
    pub max_retry_delay_ms: u64,
    /// Interval between retry-scheduler sweeps.
    pub sweep_interval: Duration,
    /// Maximum due retries re-attempted per sweep.
    pub sweep_batch: usize,
    /// Capacity of the bounded event dispatch queue.
    pub queue_capacity: usize,
    /// Maximum subscriptions per owner.
    pub max_subscriptions_per_owner: usize,
    /// Allow plain-HTTP endpoints (development only).
    pub allow_http: bool,
    /// Arm an in-process timer for each scheduled retry in addition to the
    /// periodic sweep. The claim guard makes the two paths converge.
    pub arm_retry_timers: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            user_agent: "portside-webhooks/1.0".to_string(),
            auto_disable_threshold: 10,
            max_retry_delay_ms: 86_400_000,
            sweep_interval: Duration::from_secs(30),
            sweep_batch: 100,
            queue_capacity: 1024,
            max_subscriptions_per_owner: 25,
            allow_http: false,
            arm_retry_timers: true,
        }
    }
}

impl WebhookConfig {
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_auto_disable_threshold(mut self, threshold: u32) -> Self {
        self.auto_disable_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_max_retry_delay_ms(mut self, max: u64) -> Self {
        self.max_retry_delay_ms = max;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_subscriptions_per_owner(mut self, max: usize) -> Self {
        self.max_subscriptions_per_owner = max;
        self
    }

    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    #[must_use]
    pub fn with_arm_retry_timers(mut self, arm: bool) -> Self {
        self.arm_retry_timers = arm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WebhookConfig::default();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.auto_disable_threshold, 10);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert!(!config.allow_http);
        assert!(config.arm_retry_timers);
    }

    #[test]
    fn builders() {
        let config = WebhookConfig::default()
            .with_environment(Environment::Development)
            .with_auto_disable_threshold(3)
            .with_allow_http(true)
            .with_arm_retry_timers(false);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.auto_disable_threshold, 3);
        assert!(config.allow_http);
        assert!(!config.arm_retry_timers);
    }
}
