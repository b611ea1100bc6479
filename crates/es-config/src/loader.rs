//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "eventstream.toml",
    "config.toml",
    "./config/eventstream.toml",
    "/etc/eventstream/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found), apply environment overrides, validate
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("ESTREAM_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
        // Transports
        if let Ok(val) = env::var("ESTREAM_TRANSPORTS") {
            config.transports.enabled = split_list(&val);
        }
        if let Ok(val) = env::var("ESTREAM_TRANSPORTS_CONFIG_REQUIRED") {
            config.transports.config_required = split_list(&val);
        }

        // Webhook
        override_parsed("ESTREAM_WEBHOOK_TIMEOUT_MS", &mut config.webhook.timeout_ms)?;
        override_parsed("ESTREAM_WEBHOOK_CONNECT_TIMEOUT_MS", &mut config.webhook.connect_timeout_ms)?;
        override_parsed("ESTREAM_WEBHOOK_SIGN_REQUESTS", &mut config.webhook.sign_requests)?;
        if let Ok(val) = env::var("ESTREAM_WEBHOOK_USER_AGENT") {
            config.webhook.user_agent = val;
        }

        // Retry
        override_parsed("ESTREAM_RETRY_MAX_ATTEMPTS", &mut config.retry.max_attempts)?;
        override_parsed("ESTREAM_RETRY_INITIAL_BACKOFF_MS", &mut config.retry.initial_backoff_ms)?;
        override_parsed("ESTREAM_RETRY_BACKOFF_MULTIPLIER", &mut config.retry.backoff_multiplier)?;
        override_parsed("ESTREAM_RETRY_MAX_BACKOFF_MS", &mut config.retry.max_backoff_ms)?;

        // Dispatch
        override_parsed("ESTREAM_DISPATCH_MAX_CONCURRENT", &mut config.dispatch.max_concurrent_deliveries)?;
        override_parsed("ESTREAM_DISPATCH_QUEUE_CAPACITY", &mut config.dispatch.queue_capacity)?;
        override_parsed("ESTREAM_DISPATCH_MAX_IN_FLIGHT_EVENTS", &mut config.dispatch.max_in_flight_events)?;
        override_parsed("ESTREAM_DISPATCH_SHUTDOWN_GRACE_MS", &mut config.dispatch.shutdown_grace_ms)?;
        override_parsed("ESTREAM_DISPATCH_STORE_RETRY_LIMIT", &mut config.dispatch.store_retry_limit)?;
        override_parsed("ESTREAM_DISPATCH_STORE_RETRY_DELAY_MS", &mut config.dispatch.store_retry_delay_ms)?;
        override_parsed("ESTREAM_DISPATCH_DELIVERY_LOG_CAPACITY", &mut config.dispatch.delivery_log_capacity)?;

        // Metrics
        override_parsed("ESTREAM_METRICS_ENABLED", &mut config.metrics.enabled)?;
        if let Ok(val) = env::var("ESTREAM_METRICS_LISTEN_ADDR") {
            config.metrics.listen_addr = val;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn override_parsed<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(val) = env::var(key) {
        *target = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvError(format!("{} has invalid value '{}'", key, val)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" pusher, webhook ,,"), vec!["pusher", "webhook"]);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch]\nmax_concurrent_deliveries = 4").unwrap();

        let config = ConfigLoader::with_path(file.path()).load().unwrap();
        assert_eq!(config.dispatch.max_concurrent_deliveries, 4);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transports]\nenabled = []").unwrap();

        let result = ConfigLoader::with_path(file.path()).load();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_dispatch_store_env_overrides() {
        let vars = [
            ("ESTREAM_DISPATCH_STORE_RETRY_LIMIT", "7"),
            ("ESTREAM_DISPATCH_STORE_RETRY_DELAY_MS", "250"),
            ("ESTREAM_DISPATCH_DELIVERY_LOG_CAPACITY", "64"),
        ];
        for (key, val) in vars {
            env::set_var(key, val);
        }
        let mut config = AppConfig::default();
        let result = ConfigLoader::new().apply_env_overrides(&mut config);
        for (key, _) in vars {
            env::remove_var(key);
        }

        assert!(result.is_ok());
        assert_eq!(config.dispatch.store_retry_limit, 7);
        assert_eq!(config.dispatch.store_retry_delay_ms, 250);
        assert_eq!(config.dispatch.delivery_log_capacity, 64);
    }

    #[test]
    fn test_override_parsed_reports_bad_value() {
        let key = "ESTREAM_TEST_OVERRIDE_PARSED_BAD";
        env::set_var(key, "not-a-number");
        let mut target: u32 = 1;
        let result = override_parsed(key, &mut target);
        env::remove_var(key);

        assert!(matches!(result, Err(ConfigError::EnvError(_))));
        assert_eq!(target, 1);
    }
}
