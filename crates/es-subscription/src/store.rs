//! Subscription Store
//!
//! Shared mutable registry of subscriptions. Registration is a single
//! compare-and-insert against the (transport, owner) uniqueness invariant, so
//! concurrent readers never observe a partial registration.

use std::collections::HashMap;

use async_trait::async_trait;
use es_common::{OwnerId, SubscriptionId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::entity::{Subscription, TransportKind};
use crate::{Result, SubscriptionError};

/// Optional listing filters; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub owner: Option<OwnerId>,
    pub transport: Option<TransportKind>,
}

impl SubscriptionFilter {
    pub fn by_owner(owner: impl Into<String>) -> Self {
        Self { owner: Some(OwnerId::new(owner)), transport: None }
    }

    pub fn by_transport(transport: impl AsRef<str>) -> Self {
        Self { owner: None, transport: Some(TransportKind::new(transport)) }
    }

    pub fn matches(&self, subscription: &Subscription) -> bool {
        self.owner.as_ref().map_or(true, |o| o == subscription.owner())
            && self.transport.as_ref().map_or(true, |t| t == subscription.transport())
    }
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a subscription; fails with `Duplicate` if (transport, owner) exists
    async fn register(&self, subscription: Subscription) -> Result<SubscriptionId>;

    async fn get(&self, id: &SubscriptionId) -> Result<Option<Subscription>>;

    async fn find(&self, owner: &OwnerId, transport: &TransportKind) -> Result<Option<Subscription>>;

    /// All subscriptions accepted by the filter, in registration order
    async fn list(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>>;

    /// Subscriptions whose event types are unset or contain `event_type`, in registration order
    async fn list_matching(&self, event_type: &str) -> Result<Vec<Subscription>>;

    /// Delete a subscription together with its transport config
    async fn remove(&self, id: &SubscriptionId) -> Result<Subscription>;
}

#[derive(Default)]
struct Registry {
    by_id: IndexMap<SubscriptionId, Subscription>,
    by_transport_owner: HashMap<(TransportKind, OwnerId), SubscriptionId>,
}

/// In-process store backed by an insertion-ordered map
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    registry: RwLock<Registry>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registry.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn register(&self, subscription: Subscription) -> Result<SubscriptionId> {
        let key = (subscription.transport().clone(), subscription.owner().clone());
        let mut registry = self.registry.write();

        if registry.by_transport_owner.contains_key(&key) {
            return Err(SubscriptionError::Duplicate {
                transport: key.0.to_string(),
                owner: key.1.to_string(),
            });
        }

        let id = subscription.id().clone();
        registry.by_transport_owner.insert(key, id.clone());
        registry.by_id.insert(id.clone(), subscription);

        info!(
            subscription_id = %id,
            total = registry.by_id.len(),
            "Subscription registered"
        );
        Ok(id)
    }

    async fn get(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        Ok(self.registry.read().by_id.get(id).cloned())
    }

    async fn find(&self, owner: &OwnerId, transport: &TransportKind) -> Result<Option<Subscription>> {
        let registry = self.registry.read();
        let key = (transport.clone(), owner.clone());
        Ok(registry
            .by_transport_owner
            .get(&key)
            .and_then(|id| registry.by_id.get(id))
            .cloned())
    }

    async fn list(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>> {
        Ok(self
            .registry
            .read()
            .by_id
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn list_matching(&self, event_type: &str) -> Result<Vec<Subscription>> {
        let matching: Vec<Subscription> = self
            .registry
            .read()
            .by_id
            .values()
            .filter(|s| s.matches_event_type(event_type))
            .cloned()
            .collect();

        debug!(event_type, matched = matching.len(), "Listed matching subscriptions");
        Ok(matching)
    }

    async fn remove(&self, id: &SubscriptionId) -> Result<Subscription> {
        let mut registry = self.registry.write();

        // shift_remove keeps the remaining entries in registration order
        let removed = registry
            .by_id
            .shift_remove(id)
            .ok_or_else(|| SubscriptionError::NotFound(id.clone()))?;
        registry
            .by_transport_owner
            .remove(&(removed.transport().clone(), removed.owner().clone()));

        info!(subscription_id = %id, "Subscription removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{NewSubscription, TransportCatalog, WebhookConfig};

    fn subscription(transport: &str, owner: &str, event_types: Option<&[&str]>) -> Subscription {
        let mut input = if transport == "webhook" {
            NewSubscription::webhook(owner, WebhookConfig::new("https://x/hook"))
        } else {
            NewSubscription::new(transport, owner)
        };
        if let Some(types) = event_types {
            input = input.with_event_types(types.iter().copied());
        }
        Subscription::create(&TransportCatalog::default(), input).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_find() {
        let store = InMemorySubscriptionStore::new();
        let sub = subscription("webhook", "u1", None);
        let id = store.register(sub.clone()).await.unwrap();

        assert_eq!(&id, sub.id());
        let found = store
            .find(&OwnerId::new("u1"), &TransportKind::webhook())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), &id);
        assert!(store.find(&OwnerId::new("u1"), &TransportKind::generic()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_transport_owner_rejected() {
        let store = InMemorySubscriptionStore::new();
        store.register(subscription("webhook", "u1", None)).await.unwrap();

        let err = store
            .register(subscription("webhook", "u1", Some(&["a.b"])))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Duplicate { .. }));
        assert_eq!(store.len(), 1);

        // Same owner on another transport is fine
        store.register(subscription("generic", "u1", None)).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_list_matching_keeps_registration_order() {
        let store = InMemorySubscriptionStore::new();
        let a = subscription("generic", "a", Some(&["group_member.added"]));
        let b = subscription("generic", "b", None);
        let c = subscription("generic", "c", Some(&["group.created"]));
        let d = subscription("webhook", "d", Some(&["group.created", "group_member.added"]));
        for sub in [&a, &b, &c, &d] {
            store.register(sub.clone()).await.unwrap();
        }

        let ids: Vec<SubscriptionId> = store
            .list_matching("group_member.added")
            .await
            .unwrap()
            .iter()
            .map(|s| s.id().clone())
            .collect();
        assert_eq!(ids, vec![a.id().clone(), b.id().clone(), d.id().clone()]);
    }

    #[tokio::test]
    async fn test_remove_frees_uniqueness_slot() {
        let store = InMemorySubscriptionStore::new();
        let sub = subscription("webhook", "u1", None);
        let id = store.register(sub).await.unwrap();

        let removed = store.remove(&id).await.unwrap();
        assert!(removed.webhook().is_some());
        assert!(store.is_empty());
        assert!(matches!(store.remove(&id).await, Err(SubscriptionError::NotFound(_))));

        store.register(subscription("webhook", "u1", None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = InMemorySubscriptionStore::new();
        store.register(subscription("webhook", "u1", None)).await.unwrap();
        store.register(subscription("generic", "u1", None)).await.unwrap();
        store.register(subscription("webhook", "u2", None)).await.unwrap();

        assert_eq!(store.list(&SubscriptionFilter::default()).await.unwrap().len(), 3);
        assert_eq!(store.list(&SubscriptionFilter::by_owner("u1")).await.unwrap().len(), 2);
        assert_eq!(store.list(&SubscriptionFilter::by_transport("webhook")).await.unwrap().len(), 2);

        let both = SubscriptionFilter {
            owner: Some(OwnerId::new("u2")),
            transport: Some(TransportKind::generic()),
        };
        assert!(store.list(&both).await.unwrap().is_empty());
    }
}
