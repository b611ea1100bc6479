//! EventStream Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transports: TransportsConfig,
    pub webhook: WebhookConfig,
    pub retry: RetryConfig,
    pub dispatch: DispatchConfig,
    pub metrics: MetricsConfig,

    /// Subscriptions registered at startup
    pub subscriptions: Vec<SubscriptionSeed>,
}

/// Deployment-specific transport set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportsConfig {
    /// Transport names accepted at registration
    pub enabled: Vec<String>,
    /// Transports whose subscriptions must carry transport config
    pub config_required: Vec<String>,
}

impl Default for TransportsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["generic".to_string(), "webhook".to_string()],
            config_required: vec!["webhook".to_string()],
        }
    }
}

/// Outbound webhook client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub user_agent: String,
    /// Attach HMAC signature headers when a subscription has a secret
    pub sign_requests: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            user_agent: "eventstream-webhook/0.1".to_string(),
            sign_requests: true,
        }
    }
}

/// Retry policy for retryable delivery failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per delivery, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

/// Dispatcher and event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_concurrent_deliveries: usize,
    /// Capacity of the event bus ingress queue
    pub queue_capacity: usize,
    /// Events dispatched concurrently by the bus
    pub max_in_flight_events: usize,
    pub shutdown_grace_ms: u64,
    /// Times the bus re-runs a dispatch after the subscription store was unavailable
    pub store_retry_limit: u32,
    pub store_retry_delay_ms: u64,
    /// Number of delivery attempts retained for inspection
    pub delivery_log_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_deliveries: 32,
            queue_capacity: 1024,
            max_in_flight_events: 64,
            shutdown_grace_ms: 5_000,
            store_retry_limit: 3,
            store_retry_delay_ms: 1_000,
            delivery_log_capacity: 10_000,
        }
    }
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A subscription declared in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSeed {
    pub transport: String,
    pub owner: String,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Opaque config for non-webhook transports that require one
    #[serde(default)]
    pub transport_config: Option<serde_json::Value>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings the dispatcher cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transports.enabled.is_empty() {
            return Err(ConfigError::ValidationError(
                "transports.enabled must name at least one transport".to_string(),
            ));
        }
        for name in &self.transports.config_required {
            if !listed(&self.transports.enabled, name.trim()) {
                return Err(ConfigError::ValidationError(format!(
                    "transports.config_required names '{}' which is not enabled",
                    name
                )));
            }
        }
        if listed(&self.transports.enabled, "webhook") && !listed(&self.transports.config_required, "webhook") {
            return Err(ConfigError::ValidationError(
                "transports.config_required must include 'webhook' when webhook is enabled".to_string(),
            ));
        }
        for seed in &self.subscriptions {
            if seed.webhook_url.is_some() && seed.transport_config.is_some() {
                return Err(ConfigError::ValidationError(format!(
                    "subscription seed for '{}' sets both webhook_url and transport_config",
                    seed.owner
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.dispatch.max_concurrent_deliveries == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.max_concurrent_deliveries must be at least 1".to_string(),
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.dispatch.max_in_flight_events == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.max_in_flight_events must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# EventStream Configuration
# Environment variables (ESTREAM_*) override these settings

[transports]
enabled = ["generic", "webhook"]   # e.g. ["pusher", "webhook"]
config_required = ["webhook"]

[webhook]
timeout_ms = 10000
connect_timeout_ms = 5000
user_agent = "eventstream-webhook/0.1"
sign_requests = true

[retry]
max_attempts = 3
initial_backoff_ms = 500
backoff_multiplier = 2.0
max_backoff_ms = 30000

[dispatch]
max_concurrent_deliveries = 32
queue_capacity = 1024
max_in_flight_events = 64
shutdown_grace_ms = 5000
store_retry_limit = 3
store_retry_delay_ms = 1000
delivery_log_capacity = 10000

[metrics]
enabled = false
listen_addr = "0.0.0.0:9090"

[[subscriptions]]
transport = "webhook"
owner = "user-1"
event_types = ["group_member.added"]
webhook_url = "https://example.com/hook"
webhook_secret = "change-me"

# Transports listed in config_required other than webhook take opaque config
# [[subscriptions]]
# transport = "pusher"
# owner = "user-2"
# transport_config = { channel = "private-user-2" }
"#
        .to_string()
    }
}

fn listed(names: &[String], wanted: &str) -> bool {
    names.iter().any(|n| n.trim().eq_ignore_ascii_case(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transports.enabled, vec!["generic", "webhook"]);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_example_toml_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.subscriptions.len(), 1);
        assert_eq!(config.subscriptions[0].transport, "webhook");
        assert_eq!(
            config.subscriptions[0].event_types.as_deref(),
            Some(&["group_member.added".to_string()][..])
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retry]\nmax_attempts = 5\n\n[transports]\nenabled = [\"pusher\", \"webhook\"]").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.transports.enabled, vec!["pusher", "webhook"]);
        assert_eq!(config.transports.config_required, vec!["webhook"]);
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validation_rejects_webhook_without_required_config() {
        let mut config = AppConfig::default();
        config.transports.config_required = Vec::new();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        config.transports.enabled = vec!["generic".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_seed_carries_opaque_transport_config() {
        let toml = r#"
[transports]
enabled = ["pusher", "webhook"]
config_required = ["pusher", "webhook"]

[[subscriptions]]
transport = "pusher"
owner = "user-2"
transport_config = { channel = "private-user-2" }
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.subscriptions[0].transport_config,
            Some(serde_json::json!({"channel": "private-user-2"}))
        );
    }

    #[test]
    fn test_validation_rejects_unknown_required_transport() {
        let mut config = AppConfig::default();
        config.transports.config_required = vec!["pusher".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }
}
