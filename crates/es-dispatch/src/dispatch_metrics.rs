//! Metrics for the dispatch pipeline
//!
//! Prometheus-compatible counters and histograms for:
//! - Published and unmatched events
//! - Per-transport delivery attempts and terminal outcomes
//! - Delivery latency
//! - Subscription store outages

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Record an event accepted by the bus
pub fn record_event_published(event_type: &str) {
    counter!(
        "es_events_published_total",
        "event_type" => event_type.to_string()
    )
    .increment(1);
}

/// Record an event that matched no subscription
pub fn record_event_unmatched(event_type: &str) {
    counter!(
        "es_events_unmatched_total",
        "event_type" => event_type.to_string()
    )
    .increment(1);
}

/// Record an event dropped from the queue during shutdown
pub fn record_event_abandoned() {
    counter!("es_events_abandoned_total").increment(1);
}

/// Record one transport call and its latency
pub fn record_delivery_attempt(transport: &str, result: &str, duration: Duration) {
    counter!(
        "es_delivery_attempts_total",
        "transport" => transport.to_string(),
        "result" => result.to_string()
    )
    .increment(1);

    histogram!(
        "es_delivery_duration_seconds",
        "transport" => transport.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the terminal outcome of a delivery
pub fn record_delivery_outcome(transport: &str, outcome: &str) {
    counter!(
        "es_deliveries_total",
        "transport" => transport.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_store_error() {
    counter!("es_store_errors_total").increment(1);
}

/// Update the ingress queue depth gauge
pub fn set_queue_depth(depth: usize) {
    gauge!("es_bus_queue_depth").set(depth as f64);
}
