//! Delivery Dispatcher
//!
//! Fans one event out to its matched subscriptions:
//! - deliveries run concurrently, bounded by a semaphore
//! - each subscription retries transient failures with exponential backoff
//! - deliveries to one subscription never overlap, across events too
//! - one subscription's failure never affects another's delivery
//! - a shutdown signal abandons deliveries that have not resolved

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use es_common::{AttemptOutcome, DeliveryAttempt, DeliveryResult, DomainEvent, SubscriptionId};
use es_subscription::Subscription;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex, Semaphore};
use tracing::{debug, info, warn};

use crate::matcher::EventMatcher;
use crate::retry::RetryPolicy;
use crate::transport::{TransportRegistry, TransportStrategy};
use crate::{dispatch_metrics as metrics, Result};

pub struct DeliveryDispatcher {
    matcher: EventMatcher,
    registry: Arc<TransportRegistry>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    /// Held for a subscription's whole retry sequence; entries dropped when idle
    subscription_locks: Mutex<HashMap<SubscriptionId, Arc<AsyncMutex<()>>>>,
}

/// Resolves once the shutdown flag is raised. A dropped sender never cancels.
pub(crate) async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl DeliveryDispatcher {
    pub fn new(
        matcher: EventMatcher,
        registry: Arc<TransportRegistry>,
        retry: RetryPolicy,
        max_concurrent_deliveries: usize,
    ) -> Self {
        Self {
            matcher,
            registry,
            retry,
            permits: Arc::new(Semaphore::new(max_concurrent_deliveries.max(1))),
            subscription_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Deliver `event` to every matching subscription.
    ///
    /// Returns one terminal attempt per matched subscription, in match order.
    /// Fails only when the subscription store cannot be read.
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<Vec<DeliveryAttempt>> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.dispatch_with_shutdown(event, shutdown_rx).await
    }

    /// Like [`dispatch`](Self::dispatch), but deliveries still pending when
    /// `shutdown` flips to `true` resolve as `Abandoned`.
    pub async fn dispatch_with_shutdown(
        &self,
        event: &DomainEvent,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<DeliveryAttempt>> {
        let subscriptions = self.matcher.match_event(event).await?;

        if subscriptions.is_empty() {
            metrics::record_event_unmatched(&event.event_type);
            debug!(event_id = %event.id, event_type = %event.event_type, "No matching subscriptions");
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let attempts = join_all(
            subscriptions
                .iter()
                .map(|subscription| self.deliver_to(subscription, event, shutdown.clone())),
        )
        .await;

        let succeeded = attempts.iter().filter(|a| a.outcome.is_success()).count();
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            subscriptions = attempts.len(),
            succeeded,
            failed = attempts.len() - succeeded,
            duration_ms = started.elapsed().as_millis() as u64,
            "Event dispatched"
        );

        Ok(attempts)
    }

    async fn deliver_to(
        &self,
        subscription: &Subscription,
        event: &DomainEvent,
        shutdown: watch::Receiver<bool>,
    ) -> DeliveryAttempt {
        let transport = subscription.transport().as_str();

        let strategy = match self.registry.resolve(transport) {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    subscription_id = %subscription.id(),
                    error = %e,
                    "No strategy for subscription transport"
                );
                let outcome = AttemptOutcome::UnknownTransport { transport: transport.to_string() };
                return self.finish(subscription, event, 0, outcome);
            }
        };

        let attempt_counter = AtomicU32::new(0);
        let lock = self.subscription_lock(subscription.id());
        let outcome = tokio::select! {
            biased;
            _ = cancelled(shutdown) => AttemptOutcome::Abandoned {
                detail: "Dispatch cancelled during shutdown".to_string(),
            },
            outcome = async {
                let _serial = lock.lock().await;
                self.deliver_with_retry(strategy.as_ref(), subscription, event, &attempt_counter).await
            } => outcome,
        };
        self.release_subscription_lock(subscription.id(), lock);

        self.finish(subscription, event, attempt_counter.load(Ordering::SeqCst), outcome)
    }

    fn subscription_lock(&self, id: &SubscriptionId) -> Arc<AsyncMutex<()>> {
        self.subscription_locks
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn release_subscription_lock(&self, id: &SubscriptionId, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.subscription_locks.lock();
        // Only the map and this caller still hold it
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    /// Subscriptions with a delivery running or waiting
    pub fn busy_subscriptions(&self) -> usize {
        self.subscription_locks.lock().len()
    }

    async fn deliver_with_retry(
        &self,
        strategy: &dyn TransportStrategy,
        subscription: &Subscription,
        event: &DomainEvent,
        attempt_counter: &AtomicU32,
    ) -> AttemptOutcome {
        let transport = subscription.transport().as_str();

        loop {
            let result = {
                let Ok(_permit) = self.permits.acquire().await else {
                    return AttemptOutcome::Abandoned { detail: "Delivery permits closed".to_string() };
                };
                let attempt = attempt_counter.fetch_add(1, Ordering::SeqCst) + 1;
                let started = Instant::now();
                let result = strategy.deliver(subscription, event).await;
                let label = match &result {
                    DeliveryResult::Success => "success",
                    DeliveryResult::Failure { retryable: true, .. } => "retryable",
                    DeliveryResult::Failure { retryable: false, .. } => "permanent",
                };
                metrics::record_delivery_attempt(transport, label, started.elapsed());
                (attempt, result)
            };

            match result {
                (_, DeliveryResult::Success) => return AttemptOutcome::Succeeded,
                (attempt, result) if self.retry.should_retry(attempt, &result) => {
                    let delay = self.retry.backoff_for(attempt);
                    debug!(
                        event_id = %event.id,
                        subscription_id = %subscription.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient delivery failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                (_, result) => return result.into(),
            }
        }
    }

    fn finish(
        &self,
        subscription: &Subscription,
        event: &DomainEvent,
        attempt_number: u32,
        outcome: AttemptOutcome,
    ) -> DeliveryAttempt {
        let transport = subscription.transport().to_string();
        metrics::record_delivery_outcome(&transport, outcome.label());

        match &outcome {
            AttemptOutcome::Succeeded => debug!(
                event_id = %event.id,
                subscription_id = %subscription.id(),
                attempt_number,
                "Delivery succeeded"
            ),
            AttemptOutcome::Failed { detail, .. } | AttemptOutcome::Abandoned { detail } => warn!(
                event_id = %event.id,
                subscription_id = %subscription.id(),
                transport = %transport,
                attempt_number,
                outcome = outcome.label(),
                detail = %detail,
                "Delivery failed"
            ),
            AttemptOutcome::UnknownTransport { .. } => {}
        }

        DeliveryAttempt {
            subscription_id: subscription.id().clone(),
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            transport,
            attempt_number,
            outcome,
            timestamp: Utc::now(),
        }
    }
}
