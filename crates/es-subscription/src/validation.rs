//! Registration validation keyed by transport.
//!
//! The transport decides which fields are required: webhook and the transports
//! in the catalog's `config_required` set must carry a config, all others must not.

use crate::entity::{NewSubscription, TransportCatalog, TransportConfig, TransportKind, WebhookConfig};
use crate::{Result, SubscriptionError};

/// Normalized registration fields
#[derive(Debug)]
pub(crate) struct Validated {
    pub transport: TransportKind,
    pub event_types: Option<Vec<String>>,
}

pub(crate) fn validate(catalog: &TransportCatalog, input: &NewSubscription) -> Result<Validated> {
    let transport = TransportKind::new(&input.transport);
    if transport.as_str().is_empty() {
        return Err(SubscriptionError::validation("transport", "Transport is required"));
    }
    if !catalog.contains(&transport) {
        let allowed: Vec<&str> = catalog.kinds().iter().map(TransportKind::as_str).collect();
        return Err(SubscriptionError::validation(
            "transport",
            format!("Unsupported transport '{}', expected one of [{}]", transport, allowed.join(", ")),
        ));
    }

    if input.owner.as_str().trim().is_empty() {
        return Err(SubscriptionError::validation("owner", "Owner is required"));
    }

    match (&input.transport_config, catalog.requires_config(&transport)) {
        (None, true) => {
            return Err(SubscriptionError::validation(
                "transportConfig",
                format!("Transport '{}' requires transport config", transport),
            ));
        }
        (Some(_), false) => {
            return Err(SubscriptionError::validation(
                "transportConfig",
                format!("Transport '{}' does not accept transport config", transport),
            ));
        }
        (Some(TransportConfig::Webhook(config)), true) if transport.is_webhook() => {
            validate_webhook(config)?;
        }
        (Some(TransportConfig::Opaque(_)), true) if !transport.is_webhook() => {}
        (Some(_), true) => {
            return Err(SubscriptionError::validation(
                "transportConfig",
                format!("Transport config does not match transport '{}'", transport),
            ));
        }
        (None, false) => {}
    }

    let event_types = normalize_event_types(input.event_types.as_deref())?;

    Ok(Validated { transport, event_types })
}

fn validate_webhook(config: &WebhookConfig) -> Result<()> {
    if !is_valid_webhook_url(&config.url) {
        return Err(SubscriptionError::validation(
            "transportConfig.url",
            format!("Invalid webhook URL '{}'", config.url),
        ));
    }
    if let Some(secret) = &config.secret {
        if secret.is_empty() {
            return Err(SubscriptionError::validation(
                "transportConfig.secret",
                "Webhook secret must not be empty when provided",
            ));
        }
    }
    Ok(())
}

fn is_valid_webhook_url(url: &str) -> bool {
    if url.chars().any(char::is_whitespace) {
        return false;
    }
    let rest = match url.strip_prefix("https://").or_else(|| url.strip_prefix("http://")) {
        Some(rest) => rest,
        None => return false,
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    !host.is_empty() && !host.starts_with(':')
}

/// Empty lists mean "all event types" and collapse to `None`
fn normalize_event_types(event_types: Option<&[String]>) -> Result<Option<Vec<String>>> {
    let Some(event_types) = event_types else {
        return Ok(None);
    };

    let mut normalized: Vec<String> = Vec::with_capacity(event_types.len());
    for event_type in event_types {
        let trimmed = event_type.trim();
        if trimmed.is_empty() {
            return Err(SubscriptionError::validation(
                "eventTypes",
                "Event type filters must not be blank",
            ));
        }
        if !normalized.iter().any(|t| t == trimmed) {
            normalized.push(trimmed.to_string());
        }
    }

    Ok(if normalized.is_empty() { None } else { Some(normalized) })
}
