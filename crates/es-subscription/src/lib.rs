//! EventStream Subscriptions
//!
//! Standing registrations of interest by an owner in a set of event types,
//! each bound to exactly one transport:
//! - Entity: subscription record with exclusively-owned transport config
//! - Validation: which fields a transport requires, evaluated once at construction
//! - Store: insertion-ordered registry enforcing one subscription per (transport, owner)
//! - Service: registration, listing and deletion entry points

pub mod error;
pub mod entity;
pub mod validation;
pub mod store;
pub mod service;

pub use error::SubscriptionError;
pub use entity::{
    NewSubscription, Subscription, TransportCatalog, TransportConfig, TransportKind, WebhookConfig,
};
pub use store::{InMemorySubscriptionStore, SubscriptionFilter, SubscriptionStore};
pub use service::SubscriptionService;

pub type Result<T> = std::result::Result<T, SubscriptionError>;
