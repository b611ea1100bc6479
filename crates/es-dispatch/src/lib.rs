//! EventStream Dispatch
//!
//! Matches raised domain events against registered subscriptions and delivers
//! them over pluggable transports:
//! - TransportRegistry: transport name -> delivery strategy (webhook, in-process callback)
//! - WebhookTransport: signed HTTP POST with bounded timeout and response classification
//! - EventMatcher: event type + audience filtering over the subscription store
//! - DeliveryDispatcher: concurrent fan-out with per-subscription retry and backoff
//! - EventBus: ingress queue feeding the matcher -> dispatcher pipeline, graceful shutdown
//! - GroupMembershipHandler: collaborator that publishes membership changes after commit

pub mod error;
pub mod signing;
pub mod transport;
pub mod audience;
pub mod matcher;
pub mod retry;
pub mod dispatcher;
pub mod log;
pub mod bus;
pub mod group;
pub mod dispatch_metrics;

pub use error::DispatchError;
pub use transport::{
    TransportStrategy, TransportRegistry,
    webhook::{WebhookTransport, WebhookTransportConfig},
    callback::{CallbackTransport, EventCallback},
};
pub use audience::{AudienceResolver, OpenAudience};
pub use matcher::EventMatcher;
pub use retry::RetryPolicy;
pub use dispatcher::DeliveryDispatcher;
pub use log::{DeliveryLog, InMemoryDeliveryLog};
pub use bus::{BusConfig, EventBus, EventPublisher};
pub use group::{GroupDirectory, GroupMember, GroupMembershipHandler};

pub type Result<T> = std::result::Result<T, DispatchError>;
