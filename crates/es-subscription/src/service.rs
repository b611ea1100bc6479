//! Registration, listing and deletion entry points

use std::sync::Arc;

use es_common::SubscriptionId;
use tracing::warn;

use crate::entity::{NewSubscription, Subscription, TransportCatalog};
use crate::store::{SubscriptionFilter, SubscriptionStore};
use crate::Result;

pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    catalog: TransportCatalog,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn SubscriptionStore>, catalog: TransportCatalog) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &TransportCatalog {
        &self.catalog
    }

    /// Validate and register a subscription.
    ///
    /// Fails with `Validation` for malformed input and `Duplicate` when the
    /// owner already has a subscription on the transport.
    pub async fn create(&self, input: NewSubscription) -> Result<Subscription> {
        let subscription = Subscription::create(&self.catalog, input).inspect_err(|e| {
            warn!(error = %e, "Rejected subscription registration");
        })?;

        self.store.register(subscription.clone()).await?;
        Ok(subscription)
    }

    pub async fn get(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        self.store.get(id).await
    }

    pub async fn list(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>> {
        self.store.list(filter).await
    }

    pub async fn delete(&self, id: &SubscriptionId) -> Result<Subscription> {
        self.store.remove(id).await
    }
}
