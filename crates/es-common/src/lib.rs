use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;

pub mod logging;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier of a registered subscription (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the user that owns a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a single raised domain event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Domain Events
// ============================================================================

/// Who may receive an event beyond the event-type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceScope {
    /// Every subscription whose event types match.
    #[default]
    Everyone,
    /// Only owners that are eligible for the event's origin (e.g. members of a group).
    OriginMembers,
}

/// A fact raised by a collaborator after its own state change has committed.
///
/// Events are transient: they are consumed once by the dispatch pipeline and
/// never persisted by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: EventId,
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub scope: AudienceScope,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        origin_id: Option<String>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            event_type: event_type.into(),
            payload,
            origin_id,
            scope: AudienceScope::Everyone,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_scope(mut self, scope: AudienceScope) -> Self {
        self.scope = scope;
        self
    }
}

// ============================================================================
// Delivery Types
// ============================================================================

/// Result of a single transport delivery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Success,
    Failure {
        /// Transient condition eligible for backoff-retry
        retryable: bool,
        detail: String,
    },
}

impl DeliveryResult {
    pub fn success() -> Self {
        Self::Success
    }

    pub fn retryable(detail: impl Into<String>) -> Self {
        Self::Failure { retryable: true, detail: detail.into() }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self::Failure { retryable: false, detail: detail.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failure { retryable: true, .. })
    }
}

/// Terminal outcome recorded for one subscription of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { retryable: bool, detail: String },
    /// The subscription names a transport with no registered strategy
    UnknownTransport { transport: String },
    /// Dispatch was cancelled before the delivery resolved
    Abandoned { detail: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "success",
            Self::Failed { retryable: true, .. } => "retries_exhausted",
            Self::Failed { retryable: false, .. } => "failed",
            Self::UnknownTransport { .. } => "unknown_transport",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

impl From<DeliveryResult> for AttemptOutcome {
    fn from(result: DeliveryResult) -> Self {
        match result {
            DeliveryResult::Success => Self::Succeeded,
            DeliveryResult::Failure { retryable, detail } => Self::Failed { retryable, detail },
        }
    }
}

/// Record of the terminal delivery attempt for a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    pub subscription_id: SubscriptionId,
    pub event_id: EventId,
    pub event_type: String,
    pub transport: String,
    /// 1-based number of the attempt that produced the outcome (0 if none was made)
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    pub timestamp: DateTime<Utc>,
}
