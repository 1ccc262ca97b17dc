//! Event emission and fan-out.
//!
//! Business logic emits events through an [`EventEmitter`]; the emit call
//! awaits only acceptance into a bounded queue, never a delivery outcome, so
//! a slow or failing webhook can never propagate back into the order/payment
//! transaction that produced the event.
//!
//! The [`Dispatcher`] drains the queue, resolves each event to the set of
//! eligible subscriptions (active, subscribed, healthy, filter-matched, not
//! rate-limited), creates one pending delivery log per survivor, and hands
//! each off to the delivery engine as an independent task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use portside_events::EventType;

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::engine::DeliveryEngine;
use crate::models::delivery::DeliveryLog;
use crate::ratelimit::RateLimiter;
use crate::store::{DeliveryStore, SubscriptionStore};

/// A business event emitted for webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Restricts fan-out to one owner's subscriptions when set.
    pub owner_id: Option<Uuid>,
    pub data: Value,
}

impl WebhookEvent {
    #[must_use]
    pub fn new(event_type: EventType, data: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp,
            owner_id: None,
            data,
        }
    }

    #[must_use]
    pub fn for_owner(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }
}

/// Cloneable handle used by business logic to emit events.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<WebhookEvent>,
    clock: Arc<dyn Clock>,
}

impl EventEmitter {
    /// Emit an event. Awaits acceptance into the dispatch queue only;
    /// a stopped dispatcher is logged and swallowed.
    pub async fn emit(&self, event_type: EventType, data: Value) {
        let event = WebhookEvent::new(event_type, data, self.clock.now());
        self.send(event).await;
    }

    /// Emit an event scoped to a single owner's subscriptions.
    pub async fn emit_for_owner(&self, event_type: EventType, data: Value, owner_id: Uuid) {
        let event = WebhookEvent::new(event_type, data, self.clock.now()).for_owner(owner_id);
        self.send(event).await;
    }

    async fn send(&self, event: WebhookEvent) {
        let event_type = event.event_type;
        let event_id = event.event_id;
        if self.tx.send(event).await.is_err() {
            tracing::warn!(
                target: "webhook_delivery",
                event_id = %event_id,
                event_type = %event_type,
                "Dispatcher stopped — dropping emitted event"
            );
        }
    }
}

/// Resolves emitted events to eligible subscriptions and starts deliveries.
pub struct Dispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    engine: DeliveryEngine,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    config: Arc<WebhookConfig>,
}

/// Handle for stopping a running dispatcher.
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop the dispatch loop. Events already accepted into the queue but
    /// not yet dispatched are dropped; in-flight deliveries finish on their
    /// own tasks.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        engine: DeliveryEngine,
        clock: Arc<dyn Clock>,
        config: Arc<WebhookConfig>,
    ) -> Self {
        let limiter = RateLimiter::new(deliveries.clone(), clock.clone());
        Self {
            subscriptions,
            deliveries,
            engine,
            limiter,
            clock,
            config,
        }
    }

    /// Spawn the dispatch loop and return the producer-facing emitter.
    #[must_use]
    pub fn start(self) -> (EventEmitter, DispatcherHandle) {
        let (tx, mut rx) = mpsc::channel::<WebhookEvent>(self.config.queue_capacity);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let emitter = EventEmitter {
            tx,
            clock: self.clock.clone(),
        };

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(event) => {
                            self.dispatch(&event).await;
                        }
                        None => break,
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        (emitter, DispatcherHandle {
            shutdown: shutdown_tx,
            join,
        })
    }

    /// Fan one event out to every eligible subscription.
    ///
    /// Returns the ids of the delivery logs created; the corresponding
    /// delivery attempts run on their own tasks.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Vec<Uuid> {
        let subscriptions = match self
            .subscriptions
            .find_active_by_event_type(event.event_type)
            .await
        {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to query matching subscriptions"
                );
                return Vec::new();
            }
        };

        let mut created = Vec::new();
        for sub in subscriptions {
            if let Some(owner_id) = event.owner_id {
                if sub.owner_id != owner_id {
                    continue;
                }
            }

            if !sub.health.is_healthy {
                tracing::debug!(
                    target: "webhook_delivery",
                    subscription_id = %sub.id,
                    event_id = %event.event_id,
                    "Skipping unhealthy subscription"
                );
                continue;
            }

            if !sub.filters.matches(&event.data) {
                tracing::debug!(
                    target: "webhook_delivery",
                    subscription_id = %sub.id,
                    event_id = %event.event_id,
                    "Event data does not match subscription filters"
                );
                continue;
            }

            // Rate limiting is a point-in-time suppression: skipped events
            // are not queued for later and leave no delivery log. A store
            // failure here fails open.
            match self.limiter.check(&sub).await {
                Ok(decision) if decision.is_allowed() => {}
                Ok(decision) => {
                    tracing::info!(
                        target: "webhook_delivery",
                        subscription_id = %sub.id,
                        event_id = %event.event_id,
                        decision = ?decision,
                        "Dispatch suppressed by rate limit"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        subscription_id = %sub.id,
                        error = %e,
                        "Rate limit check failed — continuing with dispatch"
                    );
                }
            }

            let log = DeliveryLog::for_event(&sub, event, self.clock.now());
            let log_id = log.id;
            if let Err(e) = self.deliveries.create(log.clone()).await {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %sub.id,
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to create delivery log"
                );
                continue;
            }
            created.push(log_id);

            let engine = self.engine.clone();
            tokio::spawn(async move {
                engine.attempt(&log).await;
            });
        }

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.event_id,
            event_type = %event.event_type,
            deliveries = created.len(),
            "Event dispatched"
        );
        created
    }
}
