use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default chat-completions endpoint base
pub const DEFAULT_CHAT_URL: &str = "https://openrouter.ai/api/v1";

/// Chat-style multimodal provider configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Base URL (including the API version segment)
    #[serde(default = "default_chat_url")]
    pub base_url: Url,
    /// Bearer credential
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Sent as `HTTP-Referer` for site identification
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Sent as `X-Title` for site identification
    #[serde(default = "default_site_name")]
    pub site_name: String,
    /// Completion token ceiling when the request does not set one
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature when the request does not set one
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_url(),
            api_key: None,
            site_url: default_site_url(),
            site_name: default_site_name(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_chat_url() -> Url {
    Url::parse(DEFAULT_CHAT_URL).expect("valid default URL")
}

fn default_site_url() -> String {
    "http://localhost:5173".to_owned()
}

fn default_site_name() -> String {
    "AI Image Generator".to_owned()
}

const fn default_max_tokens() -> u32 {
    1000
}

const fn default_temperature() -> f64 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: ChatConfig = toml::from_str("").unwrap();
        assert_eq!(config.base_url.as_str(), "https://openrouter.ai/api/v1");
        assert_eq!(config.site_name, "AI Image Generator");
        assert_eq!(config.max_tokens, 1000);
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = toml::from_str::<ChatConfig>("model = \"x\"").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
