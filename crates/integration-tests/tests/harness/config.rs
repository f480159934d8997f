//! Programmatic configuration builder for integration tests

use easel_config::Config;
use secrecy::SecretString;
use url::Url;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with no credentials configured
    pub fn new() -> Self {
        let mut config = Config::default();
        config.subscription.poll_interval = "10ms".to_owned();
        config.subscription.timeout = "5s".to_owned();

        Self { config }
    }

    /// Point the REST image API at a mock backend
    pub fn with_image_api(mut self, base_url: &str) -> Self {
        self.config.image_api.base_url = parse(base_url);
        self.config.image_api.api_key = Some(SecretString::from("test-key"));
        self
    }

    /// Point the upscaler at its own mock backend
    pub fn with_upscale(mut self, base_url: &str) -> Self {
        self.config.upscale.base_url = Some(parse(base_url));
        self.config.upscale.api_key = Some(SecretString::from("upscale-key"));
        self
    }

    /// Point the queue provider at a mock backend with the given credentials
    pub fn with_subscription(mut self, base_url: &str, keys: &[&str]) -> Self {
        self.config.subscription.base_url = parse(base_url);
        self.config.subscription.api_keys = keys.iter().map(|k| SecretString::from(*k)).collect();
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}

fn parse(url: &str) -> Url {
    url.parse().expect("valid URL")
}
