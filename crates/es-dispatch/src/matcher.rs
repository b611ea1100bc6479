//! Event Matcher
//!
//! Selects the subscriptions that should receive an event:
//! 1. event type filter (unset list receives everything)
//! 2. audience filter for origin-scoped events
//!
//! The result keeps the store's registration order.

use std::sync::Arc;

use es_common::{AudienceScope, DomainEvent};
use es_subscription::{Subscription, SubscriptionStore};
use tracing::{debug, warn};

use crate::audience::{AudienceResolver, OpenAudience};
use crate::{dispatch_metrics as metrics, DispatchError, Result};

#[derive(Clone)]
pub struct EventMatcher {
    store: Arc<dyn SubscriptionStore>,
    audience: Arc<dyn AudienceResolver>,
}

impl EventMatcher {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self::with_audience(store, Arc::new(OpenAudience))
    }

    pub fn with_audience(store: Arc<dyn SubscriptionStore>, audience: Arc<dyn AudienceResolver>) -> Self {
        Self { store, audience }
    }

    /// Subscriptions that should receive `event`.
    ///
    /// Fails with `StoreUnavailable` when the store cannot be read.
    pub async fn match_event(&self, event: &DomainEvent) -> Result<Vec<Subscription>> {
        let candidates = self.store.list_matching(&event.event_type).await.map_err(|e| {
            metrics::record_store_error();
            DispatchError::StoreUnavailable(e.to_string())
        })?;

        let matched: Vec<Subscription> = match (event.scope, event.origin_id.as_deref()) {
            (AudienceScope::Everyone, _) => candidates,
            (AudienceScope::OriginMembers, Some(origin)) => candidates
                .into_iter()
                .filter(|s| self.audience.is_eligible(origin, s.owner()))
                .collect(),
            (AudienceScope::OriginMembers, None) => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Origin-scoped event without origin id, no eligible audience"
                );
                Vec::new()
            }
        };

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            matched = matched.len(),
            "Matched event"
        );
        Ok(matched)
    }
}
