//! Transport strategies and the registry that selects them.

pub mod webhook;
pub mod callback;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use es_common::{DeliveryResult, DomainEvent};
use es_subscription::{Subscription, TransportKind};

use crate::{DispatchError, Result};

/// Delivery mechanism for one transport kind
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one event to one subscriber. Failures are values, never panics.
    async fn deliver(&self, subscription: &Subscription, event: &DomainEvent) -> DeliveryResult;
}

/// Maps transport names to strategies.
///
/// Built once at startup and shared behind an `Arc`; lookups take no locks.
#[derive(Default, Clone)]
pub struct TransportRegistry {
    strategies: HashMap<TransportKind, Arc<dyn TransportStrategy>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the strategy for a transport name
    pub fn register(&mut self, kind: impl AsRef<str>, strategy: Arc<dyn TransportStrategy>) -> &mut Self {
        self.strategies.insert(TransportKind::new(kind), strategy);
        self
    }

    pub fn with(mut self, kind: impl AsRef<str>, strategy: Arc<dyn TransportStrategy>) -> Self {
        self.register(kind, strategy);
        self
    }

    pub fn resolve(&self, transport: &str) -> Result<Arc<dyn TransportStrategy>> {
        self.strategies
            .get(&TransportKind::new(transport))
            .cloned()
            .ok_or_else(|| DispatchError::UnknownTransport(transport.to_string()))
    }

    pub fn contains(&self, transport: &str) -> bool {
        self.strategies.contains_key(&TransportKind::new(transport))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
