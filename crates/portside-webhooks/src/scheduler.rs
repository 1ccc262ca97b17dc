//! Periodic retry sweep — the durability backstop.
//!
//! The engine's in-process timers give fast retry turnaround but do not
//! survive a process restart. The scheduler re-discovers due retries from
//! the delivery store on a fixed interval, so no scheduled retry is ever
//! lost. Both paths converge on the engine's guarded attempt, so a retry
//! picked up by both fires exactly once.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::engine::DeliveryEngine;
use crate::store::{DeliveryStore, SubscriptionStore};

/// Periodic sweep over due retries.
pub struct RetryScheduler {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    engine: DeliveryEngine,
    clock: Arc<dyn Clock>,
    config: Arc<WebhookConfig>,
}

/// Handle for stopping a running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

impl RetryScheduler {
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

    /// Spawn the sweep loop.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a freshly started
            // scheduler does not race deliveries still in their first attempt.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        SchedulerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }

    /// Re-attempt every delivery whose retry time has elapsed.
    ///
    /// Retries whose subscription has been deleted or disabled in the
    /// meantime are abandoned instead of re-attempted.
    pub async fn sweep(&self) {
        let now = self.clock.now();
        let due = match self
            .deliveries
            .find_due_retries(now, self.config.sweep_batch)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Retry sweep failed to query due deliveries"
                );
                return;
            }
        };

        if due.is_empty() {
            return;
        }

        tracing::debug!(
            target: "webhook_delivery",
            due = due.len(),
            "Retry sweep found due deliveries"
        );

        for log in due {
            match self.subscriptions.get(log.subscription_id).await {
                Ok(Some(sub)) if sub.active => {
                    self.engine.attempt(&log).await;
                }
                Ok(Some(_)) => {
                    if let Err(e) = self
                        .deliveries
                        .mark_abandoned(log.id, "subscription disabled", now)
                        .await
                    {
                        tracing::error!(
                            target: "webhook_delivery",
                            delivery_id = %log.id,
                            error = %e,
                            "Failed to abandon retry for disabled subscription"
                        );
                    }
                }
                Ok(None) => {
                    if let Err(e) = self
                        .deliveries
                        .mark_abandoned(log.id, "subscription deleted", now)
                        .await
                    {
                        tracing::error!(
                            target: "webhook_delivery",
                            delivery_id = %log.id,
                            error = %e,
                            "Failed to abandon retry for deleted subscription"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        delivery_id = %log.id,
                        error = %e,
                        "Failed to load subscription during sweep"
                    );
                }
            }
        }
    }
}
