//! Subscription Entity
//!
//! Binds an owner's interest in event types to one delivery transport.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use es_common::{OwnerId, SubscriptionId};
use serde::{Deserialize, Serialize};

use crate::validation;
use crate::Result;

/// Name of a delivery transport (normalized to lowercase).
///
/// The accepted set is deployment-specific, see [`TransportCatalog`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportKind(String);

impl TransportKind {
    pub const GENERIC: &'static str = "generic";
    pub const WEBHOOK: &'static str = "webhook";
    pub const PUSHER: &'static str = "pusher";

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn generic() -> Self {
        Self::new(Self::GENERIC)
    }

    pub fn webhook() -> Self {
        Self::new(Self::WEBHOOK)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_webhook(&self) -> bool {
        self.0 == Self::WEBHOOK
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The transports a deployment accepts, and which of them need transport config.
#[derive(Debug, Clone)]
pub struct TransportCatalog {
    enabled: Vec<TransportKind>,
    config_required: HashSet<TransportKind>,
}

impl TransportCatalog {
    pub fn new<I, J, S, T>(enabled: I, config_required: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            enabled: enabled.into_iter().map(TransportKind::new).collect(),
            config_required: config_required.into_iter().map(TransportKind::new).collect(),
        }
    }

    pub fn contains(&self, kind: &TransportKind) -> bool {
        self.enabled.contains(kind)
    }

    /// Webhook always needs a target URL regardless of the configured set
    pub fn requires_config(&self, kind: &TransportKind) -> bool {
        kind.is_webhook() || self.config_required.contains(kind)
    }

    pub fn kinds(&self) -> &[TransportKind] {
        &self.enabled
    }
}

impl Default for TransportCatalog {
    fn default() -> Self {
        Self::new(
            [TransportKind::GENERIC, TransportKind::WEBHOOK],
            [TransportKind::WEBHOOK],
        )
    }
}

/// Webhook delivery target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,
    /// Per-subscription signing secret; requests are unsigned without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), secret: None }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

/// Transport-specific payload owned by exactly one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportConfig {
    Webhook(WebhookConfig),
    /// Config for deployment-specific transports that require one
    Opaque(serde_json::Value),
}

/// Registration input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub transport: String,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    pub owner: OwnerId,
    #[serde(default)]
    pub transport_config: Option<TransportConfig>,
}

impl NewSubscription {
    pub fn new(transport: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            event_types: None,
            owner: OwnerId::new(owner),
            transport_config: None,
        }
    }

    pub fn webhook(owner: impl Into<String>, config: WebhookConfig) -> Self {
        Self::new(TransportKind::WEBHOOK, owner).with_transport_config(TransportConfig::Webhook(config))
    }

    pub fn with_event_types<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = Some(event_types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = Some(config);
        self
    }
}

/// A registered subscription.
///
/// Transport and owner are fixed at construction; the transport config is
/// owned by the subscription and removed together with it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    id: SubscriptionId,
    transport: TransportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_types: Option<Vec<String>>,
    owner: OwnerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    transport_config: Option<TransportConfig>,
    created_at: DateTime<Utc>,
}

impl Subscription {
    /// Validate the input against the catalog and build the subscription
    pub fn create(catalog: &TransportCatalog, input: NewSubscription) -> Result<Self> {
        let validated = validation::validate(catalog, &input)?;

        Ok(Self {
            id: SubscriptionId::generate(),
            transport: validated.transport,
            event_types: validated.event_types,
            owner: input.owner,
            transport_config: input.transport_config,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn transport(&self) -> &TransportKind {
        &self.transport
    }

    /// `None` subscribes to every event type
    pub fn event_types(&self) -> Option<&[String]> {
        self.event_types.as_deref()
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn transport_config(&self) -> Option<&TransportConfig> {
        self.transport_config.as_ref()
    }

    pub fn webhook(&self) -> Option<&WebhookConfig> {
        match &self.transport_config {
            Some(TransportConfig::Webhook(config)) => Some(config),
            _ => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn matches_event_type(&self, event_type: &str) -> bool {
        match &self.event_types {
            None => true,
            Some(types) => types.iter().any(|t| t == event_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TransportCatalog {
        TransportCatalog::default()
    }

    #[test]
    fn test_transport_kind_normalizes() {
        assert_eq!(TransportKind::new(" Webhook "), TransportKind::webhook());
        assert!(TransportKind::new("WEBHOOK").is_webhook());
        assert!(!TransportKind::generic().is_webhook());
    }

    #[test]
    fn test_catalog_defaults() {
        let catalog = catalog();
        assert!(catalog.contains(&TransportKind::generic()));
        assert!(catalog.contains(&TransportKind::webhook()));
        assert!(!catalog.contains(&TransportKind::new(TransportKind::PUSHER)));
        assert!(catalog.requires_config(&TransportKind::webhook()));
        assert!(!catalog.requires_config(&TransportKind::generic()));
    }

    #[test]
    fn test_webhook_requires_config_even_when_unlisted() {
        let catalog = TransportCatalog::new(["generic", "webhook"], Vec::<String>::new());
        assert!(catalog.requires_config(&TransportKind::webhook()));
        assert!(!catalog.requires_config(&TransportKind::generic()));
    }

    #[test]
    fn test_matches_all_when_event_types_absent() {
        let sub = Subscription::create(&catalog(), NewSubscription::new("generic", "u1")).unwrap();
        assert!(sub.matches_event_type("group_member.added"));
        assert!(sub.matches_event_type("anything.else"));
    }

    #[test]
    fn test_matches_listed_event_types_only() {
        let sub = Subscription::create(
            &catalog(),
            NewSubscription::new("generic", "u1").with_event_types(["group_member.added", "group.created"]),
        )
        .unwrap();

        assert!(sub.matches_event_type("group_member.added"));
        assert!(sub.matches_event_type("group.created"));
        assert!(!sub.matches_event_type("group_member.removed"));
    }

    #[test]
    fn test_webhook_accessor() {
        let sub = Subscription::create(
            &catalog(),
            NewSubscription::webhook("u1", WebhookConfig::new("https://x/hook").with_secret("s3cret")),
        )
        .unwrap();

        let webhook = sub.webhook().unwrap();
        assert_eq!(webhook.url, "https://x/hook");
        assert_eq!(webhook.secret.as_deref(), Some("s3cret"));
        assert_eq!(sub.owner().as_str(), "u1");
    }

    #[test]
    fn test_new_subscription_deserializes() {
        let input: NewSubscription = serde_json::from_value(serde_json::json!({
            "transport": "webhook",
            "eventTypes": ["group_member.added"],
            "owner": "U1",
            "transportConfig": {"webhook": {"url": "https://x/hook"}}
        }))
        .unwrap();

        assert_eq!(input.owner.as_str(), "U1");
        assert_eq!(
            input.transport_config,
            Some(TransportConfig::Webhook(WebhookConfig::new("https://x/hook")))
        );
    }
}
