use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default queue endpoint of the managed subscription service
pub const DEFAULT_SUBSCRIPTION_URL: &str = "https://queue.fal.run";

/// Managed subscription (queue) provider configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// Queue base URL
    #[serde(default = "default_subscription_url")]
    pub base_url: Url,
    /// Credentials in rotation order
    #[serde(default)]
    pub api_keys: Vec<SecretString>,
    /// Delay between queue status polls (e.g. "500ms", "1s")
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Give up waiting for a queued job after this long (e.g. "5m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: default_subscription_url(),
            api_keys: Vec::new(),
            poll_interval: default_poll_interval(),
            timeout: default_timeout(),
        }
    }
}

impl SubscriptionConfig {
    /// Parsed poll interval
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn poll_interval_duration(&self) -> anyhow::Result<Duration> {
        parse_duration("subscription.poll_interval", &self.poll_interval)
    }

    /// Parsed overall timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn timeout_duration(&self) -> anyhow::Result<Duration> {
        parse_duration("subscription.timeout", &self.timeout)
    }
}

fn parse_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration for {field} '{value}': {e}"))
}

fn default_subscription_url() -> Url {
    Url::parse(DEFAULT_SUBSCRIPTION_URL).expect("valid default URL")
}

fn default_poll_interval() -> String {
    "1s".to_owned()
}

fn default_timeout() -> String {
    "5m".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: SubscriptionConfig = toml::from_str("").unwrap();
        assert_eq!(config.base_url.as_str(), "https://queue.fal.run/");
        assert!(config.api_keys.is_empty());
        assert_eq!(config.poll_interval_duration().unwrap(), Duration::from_secs(1));
        assert_eq!(config.timeout_duration().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn rotation_set_keeps_order() {
        let config: SubscriptionConfig = toml::from_str(
            r#"
            api_keys = ["key-a", "key-b", "key-c"]
            poll_interval = "250ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_keys.len(), 3);
        assert_eq!(config.poll_interval_duration().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn malformed_duration() {
        let config = SubscriptionConfig {
            timeout: "soon".to_owned(),
            ..SubscriptionConfig::default()
        };
        let err = config.timeout_duration().unwrap_err();
        assert!(err.to_string().contains("subscription.timeout"));
    }
}
