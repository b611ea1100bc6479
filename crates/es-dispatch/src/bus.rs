//! Event Bus - ingress for domain events
//!
//! Collaborators publish events after their own state change commits. A bounded
//! queue decouples publishing from delivery. The worker hands each event to its
//! own task, up to `max_in_flight_events` at once, so a slow subscriber on one
//! event never holds back delivery of later events to anyone else.
//!
//! Shutdown stops intake, lets in-flight and queued events drain for a grace
//! period, then cancels in-flight deliveries and drops whatever is still queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use es_common::{DomainEvent, EventId};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::dispatcher::{cancelled, DeliveryDispatcher};
use crate::log::DeliveryLog;
use crate::{dispatch_metrics as metrics, DispatchError, Result};

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub queue_capacity: usize,
    /// Events dispatched concurrently; further events wait in the queue
    pub max_in_flight_events: usize,
    /// How long shutdown waits for queued and in-flight events
    pub shutdown_grace: Duration,
    /// Store outages tolerated per event before it is dropped
    pub store_retry_limit: u32,
    pub store_retry_delay: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight_events: 64,
            shutdown_grace: Duration::from_secs(5),
            store_retry_limit: 3,
            store_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Anything that accepts domain events for dispatch
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_event(&self, event: DomainEvent) -> Result<EventId>;
}

pub struct EventBus {
    sender: Mutex<Option<mpsc::Sender<DomainEvent>>>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    accepting: AtomicBool,
    config: BusConfig,
}

impl EventBus {
    /// Start the dispatch worker. Must be called inside a tokio runtime.
    pub fn start(dispatcher: Arc<DeliveryDispatcher>, log: Arc<dyn DeliveryLog>, config: BusConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(receiver, dispatcher, log, shutdown_rx, config.clone()));

        info!(
            queue_capacity = config.queue_capacity,
            max_in_flight_events = config.max_in_flight_events,
            "Event bus started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
            accepting: AtomicBool::new(true),
            config,
        }
    }

    /// Raise an event. Returns once it is queued, not once it is delivered.
    pub async fn publish(
        &self,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        origin_id: Option<String>,
    ) -> Result<EventId> {
        self.publish_event(DomainEvent::new(event_type, payload, origin_id)).await
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop intake and drain. Deliveries still pending after the grace period
    /// are abandoned. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        // Dropping the last sender lets the worker finish once the queue is empty
        drop(self.sender.lock().take());

        let Some(mut worker) = self.worker.lock().take() else {
            return;
        };

        info!(grace_ms = self.config.shutdown_grace.as_millis() as u64, "Event bus shutting down");

        match tokio::time::timeout(self.config.shutdown_grace, &mut worker).await {
            Ok(_) => info!("Event bus drained"),
            Err(_) => {
                warn!("Shutdown grace period elapsed, cancelling in-flight deliveries");
                let _ = self.shutdown_tx.send(true);
                if let Err(e) = worker.await {
                    error!(error = %e, "Dispatch worker terminated abnormally");
                }
            }
        }
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish_event(&self, event: DomainEvent) -> Result<EventId> {
        if !self.is_accepting() {
            return Err(DispatchError::ShutdownInProgress);
        }
        let sender = self.sender.lock().clone().ok_or(DispatchError::ShutdownInProgress)?;

        let id = event.id.clone();
        let event_type = event.event_type.clone();
        sender.send(event).await.map_err(|_| DispatchError::ShutdownInProgress)?;

        metrics::record_event_published(&event_type);
        metrics::set_queue_depth(sender.max_capacity() - sender.capacity());
        debug!(event_id = %id, event_type = %event_type, "Event published");
        Ok(id)
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<DomainEvent>,
    dispatcher: Arc<DeliveryDispatcher>,
    log: Arc<dyn DeliveryLog>,
    shutdown_rx: watch::Receiver<bool>,
    config: BusConfig,
) {
    let in_flight = Arc::new(Semaphore::new(config.max_in_flight_events.max(1)));
    let mut tasks = JoinSet::new();

    loop {
        let permit = tokio::select! {
            biased;
            _ = cancelled(shutdown_rx.clone()) => break,
            permit = in_flight.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let event = tokio::select! {
            biased;
            _ = cancelled(shutdown_rx.clone()) => break,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        metrics::set_queue_depth(receiver.len());

        let dispatcher = dispatcher.clone();
        let log = log.clone();
        let shutdown_rx = shutdown_rx.clone();
        let config = config.clone();
        tasks.spawn(async move {
            let _permit = permit;
            process_event(&event, &dispatcher, log.as_ref(), &shutdown_rx, &config).await;
        });

        while let Some(result) = tasks.try_join_next() {
            report_task(result);
        }
    }

    receiver.close();
    let mut abandoned = 0usize;
    while let Ok(event) = receiver.try_recv() {
        warn!(event_id = %event.id, event_type = %event.event_type, "Event abandoned during shutdown");
        metrics::record_event_abandoned();
        abandoned += 1;
    }
    metrics::set_queue_depth(0);

    // In-flight events finish or resolve as abandoned once shutdown is raised
    while let Some(result) = tasks.join_next().await {
        report_task(result);
    }

    info!(abandoned, "Dispatch worker stopped");
}

fn report_task(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Event dispatch task failed");
    }
}

async fn process_event(
    event: &DomainEvent,
    dispatcher: &DeliveryDispatcher,
    log: &dyn DeliveryLog,
    shutdown_rx: &watch::Receiver<bool>,
    config: &BusConfig,
) {
    let mut store_failures = 0u32;

    loop {
        match dispatcher.dispatch_with_shutdown(event, shutdown_rx.clone()).await {
            Ok(attempts) => {
                for attempt in attempts {
                    log.record(attempt);
                }
                return;
            }
            Err(DispatchError::StoreUnavailable(reason))
                if store_failures < config.store_retry_limit && !*shutdown_rx.borrow() =>
            {
                store_failures += 1;
                error!(
                    event_id = %event.id,
                    reason = %reason,
                    failures = store_failures,
                    "Subscription store unavailable, retrying event"
                );
                tokio::select! {
                    _ = cancelled(shutdown_rx.clone()) => {}
                    _ = tokio::time::sleep(config.store_retry_delay) => {}
                }
            }
            Err(e) => {
                error!(event_id = %event.id, event_type = %event.event_type, error = %e, "Event dropped");
                return;
            }
        }
    }
}
