//! DeliveryDispatcher Tests
//!
//! Tests for:
//! - Partial failure isolation across subscribers
//! - Unknown transport outcome
//! - Store outage surfaced as StoreUnavailable
//! - Group-scoped webhook delivery end to end

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use es_common::{AttemptOutcome, DomainEvent, OwnerId, SubscriptionId};
use es_dispatch::group::MEMBER_ADDED;
use es_dispatch::{
    CallbackTransport, DeliveryDispatcher, DispatchError, EventMatcher, EventPublisher,
    GroupDirectory, GroupMembershipHandler, RetryPolicy, TransportRegistry, WebhookTransport,
    WebhookTransportConfig,
};
use es_subscription::{
    InMemorySubscriptionStore, NewSubscription, Subscription, SubscriptionError, SubscriptionFilter,
    SubscriptionService, SubscriptionStore, TransportCatalog, TransportKind, WebhookConfig,
};
use parking_lot::Mutex;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Store whose reads always fail
struct UnavailableStore;

#[async_trait]
impl SubscriptionStore for UnavailableStore {
    async fn register(&self, _: Subscription) -> Result<SubscriptionId, SubscriptionError> {
        Err(SubscriptionError::StoreUnavailable("connection refused".into()))
    }

    async fn get(&self, _: &SubscriptionId) -> Result<Option<Subscription>, SubscriptionError> {
        Err(SubscriptionError::StoreUnavailable("connection refused".into()))
    }

    async fn find(&self, _: &OwnerId, _: &TransportKind) -> Result<Option<Subscription>, SubscriptionError> {
        Err(SubscriptionError::StoreUnavailable("connection refused".into()))
    }

    async fn list(&self, _: &SubscriptionFilter) -> Result<Vec<Subscription>, SubscriptionError> {
        Err(SubscriptionError::StoreUnavailable("connection refused".into()))
    }

    async fn list_matching(&self, _: &str) -> Result<Vec<Subscription>, SubscriptionError> {
        Err(SubscriptionError::StoreUnavailable("connection refused".into()))
    }

    async fn remove(&self, _: &SubscriptionId) -> Result<Subscription, SubscriptionError> {
        Err(SubscriptionError::StoreUnavailable("connection refused".into()))
    }
}

/// Publisher that hands events straight to a dispatcher and keeps the attempts
struct InlinePublisher {
    dispatcher: DeliveryDispatcher,
    attempts: Mutex<Vec<es_common::DeliveryAttempt>>,
}

#[async_trait]
impl EventPublisher for InlinePublisher {
    async fn publish_event(&self, event: DomainEvent) -> es_dispatch::Result<es_common::EventId> {
        let attempts = self.dispatcher.dispatch(&event).await?;
        self.attempts.lock().extend(attempts);
        Ok(event.id)
    }
}

fn retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), 2.0, Duration::from_millis(5))
}

#[tokio::test]
async fn test_one_failing_subscriber_does_not_affect_others() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let service = SubscriptionService::new(store.clone(), TransportCatalog::default());
    for owner in ["U1", "U2", "U3"] {
        service.create(NewSubscription::new("generic", owner)).await.unwrap();
    }

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    let callback = CallbackTransport::from_fn("generic", move |sub, _| {
        if sub.owner().as_str() == "U2" {
            anyhow::bail!("subscriber rejected payload");
        }
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let registry = TransportRegistry::new().with("generic", Arc::new(callback));
    let dispatcher = DeliveryDispatcher::new(EventMatcher::new(store), Arc::new(registry), retry(), 4);

    let attempts = dispatcher
        .dispatch(&DomainEvent::new("group.updated", serde_json::Value::Null, None))
        .await
        .unwrap();

    let outcomes: Vec<&str> = attempts.iter().map(|a| a.outcome.label()).collect();
    assert_eq!(outcomes, vec!["success", "failed", "success"]);
    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert!(attempts.iter().all(|a| a.attempt_number == 1));
}

#[tokio::test]
async fn test_unknown_transport_recorded_without_blocking_others() {
    let catalog = TransportCatalog::new(["generic", "pusher"], Vec::<String>::new());
    let store = Arc::new(InMemorySubscriptionStore::new());
    let service = SubscriptionService::new(store.clone(), catalog);
    service.create(NewSubscription::new("pusher", "U1")).await.unwrap();
    service.create(NewSubscription::new("generic", "U2")).await.unwrap();

    let registry = TransportRegistry::new()
        .with("generic", Arc::new(CallbackTransport::from_fn("generic", |_, _| Ok(()))));
    let dispatcher = DeliveryDispatcher::new(EventMatcher::new(store), Arc::new(registry), retry(), 4);

    let attempts = dispatcher
        .dispatch(&DomainEvent::new("a.b", serde_json::Value::Null, None))
        .await
        .unwrap();

    assert_eq!(attempts.len(), 2);
    assert_eq!(
        attempts[0].outcome,
        AttemptOutcome::UnknownTransport { transport: "pusher".to_string() }
    );
    assert_eq!(attempts[0].attempt_number, 0);
    assert_eq!(attempts[1].outcome, AttemptOutcome::Succeeded);
}

#[tokio::test]
async fn test_store_outage_is_reported() {
    let dispatcher = DeliveryDispatcher::new(
        EventMatcher::new(Arc::new(UnavailableStore)),
        Arc::new(TransportRegistry::new()),
        retry(),
        4,
    );

    let err = dispatcher
        .dispatch(&DomainEvent::new("a.b", serde_json::Value::Null, None))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::StoreUnavailable(reason) if reason.contains("connection refused")));
}

#[tokio::test]
async fn test_group_member_added_reaches_member_webhook_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/u1"))
        .and(body_partial_json(serde_json::json!({
            "eventType": "group_member.added",
            "originId": "G1",
            "payload": {"groupId": "G1", "userId": "U2"}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    // Not a member of G1: must never be called
    Mock::given(method("POST"))
        .and(path("/outsider"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let store = Arc::new(InMemorySubscriptionStore::new());
    let service = SubscriptionService::new(store.clone(), TransportCatalog::default());
    service
        .create(
            NewSubscription::webhook("U1", WebhookConfig::new(format!("{}/u1", mock_server.uri())))
                .with_event_types([MEMBER_ADDED]),
        )
        .await
        .unwrap();
    service
        .create(
            NewSubscription::webhook("U9", WebhookConfig::new(format!("{}/outsider", mock_server.uri())))
                .with_event_types([MEMBER_ADDED]),
        )
        .await
        .unwrap();

    let directory = Arc::new(GroupDirectory::new());
    directory.add_member("G1", &OwnerId::new("U1"));

    let webhook = WebhookTransport::new(WebhookTransportConfig::default()).unwrap();
    let registry = TransportRegistry::new().with("webhook", Arc::new(webhook));
    let dispatcher = DeliveryDispatcher::new(
        EventMatcher::with_audience(store, directory.clone()),
        Arc::new(registry),
        retry(),
        4,
    );
    let publisher = Arc::new(InlinePublisher { dispatcher, attempts: Mutex::new(Vec::new()) });
    let handler = GroupMembershipHandler::new(directory.clone(), publisher.clone());

    handler.add_member("G1", &OwnerId::new("U2")).await.unwrap();

    {
        let attempts = publisher.attempts.lock();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].event_type, MEMBER_ADDED);
        assert_eq!(attempts[0].outcome, AttemptOutcome::Succeeded);
    }

    // Re-adding raises nothing
    handler.add_member("G1", &OwnerId::new("U2")).await.unwrap();
    assert_eq!(publisher.attempts.lock().len(), 1);
}
