//! Webhook transport - HTTP POST delivery
//!
//! - JSON envelope `{eventId, eventType, subscriptionId, originId, occurredAt, payload}`
//! - HMAC-SHA256 signing (X-EVENTSTREAM-SIGNATURE, X-EVENTSTREAM-TIMESTAMP) when the
//!   subscription carries a secret
//! - Bounded request and connect timeouts
//! - Response classification into success / retryable / permanent

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use es_common::{DeliveryResult, DomainEvent, EventId, SubscriptionId};
use es_subscription::Subscription;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::TransportStrategy;
use crate::signing::{sign_payload, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::Result;

pub const EVENT_TYPE_HEADER: &str = "X-EVENTSTREAM-EVENT-TYPE";

#[derive(Debug, Clone)]
pub struct WebhookTransportConfig {
    /// Whole-request timeout; a delivery never blocks longer than this
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Attach signature headers for subscriptions that carry a secret
    pub sign_requests: bool,
}

impl Default for WebhookTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("eventstream/{}", env!("CARGO_PKG_VERSION")),
            sign_requests: true,
        }
    }
}

/// Body posted to the subscriber's URL
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEnvelope<'a> {
    event_id: &'a EventId,
    event_type: &'a str,
    subscription_id: &'a SubscriptionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin_id: Option<&'a str>,
    occurred_at: DateTime<Utc>,
    payload: &'a serde_json::Value,
}

pub struct WebhookTransport {
    client: Client,
    config: WebhookTransportConfig,
}

impl WebhookTransport {
    pub fn new(config: WebhookTransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(10)
            .build()?;

        info!(
            timeout_ms = config.timeout.as_millis() as u64,
            sign_requests = config.sign_requests,
            "WebhookTransport initialized"
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WebhookTransportConfig {
        &self.config
    }
}

/// Map an HTTP status to a delivery result.
///
/// 2xx succeed. 5xx, 408 and 429 are transient. Every other status is permanent.
pub fn classify_status(status: StatusCode) -> DeliveryResult {
    let code = status.as_u16();
    if status.is_success() {
        DeliveryResult::success()
    } else if status.is_server_error() {
        DeliveryResult::retryable(format!("HTTP {}: Server error", code))
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        DeliveryResult::retryable(format!("HTTP {}: Transient client error", code))
    } else if status.is_client_error() {
        DeliveryResult::permanent(format!("HTTP {}: Client error", code))
    } else {
        DeliveryResult::permanent(format!("HTTP {}: Unexpected status", code))
    }
}

#[async_trait]
impl TransportStrategy for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, subscription: &Subscription, event: &DomainEvent) -> DeliveryResult {
        let Some(webhook) = subscription.webhook() else {
            return DeliveryResult::permanent("Subscription has no webhook configuration");
        };

        let envelope = WebhookEnvelope {
            event_id: &event.id,
            event_type: &event.event_type,
            subscription_id: subscription.id(),
            origin_id: event.origin_id.as_deref(),
            occurred_at: event.occurred_at,
            payload: &event.payload,
        };
        let body = match serde_json::to_string(&envelope) {
            Ok(body) => body,
            Err(e) => return DeliveryResult::permanent(format!("Failed to serialize event: {}", e)),
        };

        debug!(
            event_id = %event.id,
            subscription_id = %subscription.id(),
            target = %webhook.url,
            signed = webhook.secret.is_some() && self.config.sign_requests,
            "Posting webhook"
        );

        let mut request = self
            .client
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header(EVENT_TYPE_HEADER, event.event_type.as_str());

        if self.config.sign_requests {
            if let Some(secret) = &webhook.secret {
                let (signature, timestamp) = sign_payload(&body, secret);
                request = request
                    .header(SIGNATURE_HEADER, signature)
                    .header(TIMESTAMP_HEADER, timestamp);
            }
        }

        match request.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                let result = classify_status(status);
                match &result {
                    DeliveryResult::Success => debug!(
                        event_id = %event.id,
                        subscription_id = %subscription.id(),
                        status_code = status.as_u16(),
                        "Webhook delivered"
                    ),
                    DeliveryResult::Failure { retryable, .. } => warn!(
                        event_id = %event.id,
                        subscription_id = %subscription.id(),
                        status_code = status.as_u16(),
                        retryable,
                        "Webhook rejected"
                    ),
                }
                result
            }
            Err(e) if e.is_timeout() => {
                warn!(event_id = %event.id, error = %e, "Webhook request timeout");
                DeliveryResult::retryable("Request timeout")
            }
            Err(e) if e.is_connect() => {
                warn!(event_id = %event.id, error = %e, "Webhook connection error");
                DeliveryResult::retryable(format!("Connection error: {}", e))
            }
            Err(e) if e.is_builder() => {
                error!(event_id = %event.id, target = %webhook.url, error = %e, "Invalid webhook request");
                DeliveryResult::permanent(format!("Invalid request: {}", e))
            }
            Err(e) => {
                error!(
                    event_id = %event.id,
                    target = %webhook.url,
                    error = %e,
                    is_request = e.is_request(),
                    is_body = e.is_body(),
                    "Webhook request failed"
                );
                DeliveryResult::retryable(format!("Request failed: {}", e))
            }
        }
    }
}
