//! Delivery log - terminal attempt records for inspection.

use std::collections::VecDeque;

use es_common::{DeliveryAttempt, SubscriptionId};
use parking_lot::Mutex;

pub trait DeliveryLog: Send + Sync {
    fn record(&self, attempt: DeliveryAttempt);

    /// Most recent records, newest last
    fn recent(&self, limit: usize) -> Vec<DeliveryAttempt>;

    fn for_subscription(&self, id: &SubscriptionId) -> Vec<DeliveryAttempt>;
}

/// Bounded ring buffer; the oldest records are evicted at capacity.
pub struct InMemoryDeliveryLog {
    capacity: usize,
    entries: Mutex<VecDeque<DeliveryAttempt>>,
}

impl InMemoryDeliveryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))) }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<DeliveryAttempt> {
        self.entries.lock().iter().cloned().collect()
    }
}

impl Default for InMemoryDeliveryLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl DeliveryLog for InMemoryDeliveryLog {
    fn record(&self, attempt: DeliveryAttempt) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(attempt);
    }

    fn recent(&self, limit: usize) -> Vec<DeliveryAttempt> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    fn for_subscription(&self, id: &SubscriptionId) -> Vec<DeliveryAttempt> {
        self.entries
            .lock()
            .iter()
            .filter(|a| &a.subscription_id == id)
            .cloned()
            .collect()
    }
}
