use es_common::SubscriptionId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Validation error on {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Duplicate subscription: owner {owner} already subscribed via {transport}")]
    Duplicate { transport: String, owner: String },

    #[error("Subscription not found: {0}")]
    NotFound(SubscriptionId),

    #[error("Subscription store unavailable: {0}")]
    StoreUnavailable(String),
}

impl SubscriptionError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field, message: message.into() }
    }
}
