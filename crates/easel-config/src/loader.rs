use std::path::Path;

use crate::{Config, SecretResolver, secrets::EnvSecretResolver};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders from the process
    /// environment, then deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, variable expansion fails,
    /// TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Self::load_with(path, &EnvSecretResolver)
    }

    /// Load configuration, resolving placeholders through `resolver`
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`]
    pub fn load_with(path: &Path, resolver: &dyn SecretResolver) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config = Self::parse_with(&raw, resolver)?;

        tracing::debug!(path = %path.display(), "configuration loaded");

        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if variable expansion, parsing, or validation fails
    pub fn parse_with(raw: &str, resolver: &dyn SecretResolver) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_with(raw, resolver).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider credential is present, a base URL
    /// cannot serve as an HTTP endpoint, or subscription timings are invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_has_credentials()?;
        self.validate_base_urls()?;
        self.validate_subscription()?;
        Ok(())
    }

    /// Ensure at least one provider can be called
    fn validate_has_credentials(&self) -> anyhow::Result<()> {
        let has_image_api = self.image_api.api_key.is_some() || self.upscale.api_key.is_some();
        let has_chat = self.chat.api_key.is_some();
        let has_subscription = !self.subscription.api_keys.is_empty();

        if !has_image_api && !has_chat && !has_subscription {
            anyhow::bail!(
                "at least one provider credential must be configured (image_api, upscale, chat, or subscription)"
            );
        }

        Ok(())
    }

    fn validate_base_urls(&self) -> anyhow::Result<()> {
        let mut urls = vec![
            ("image_api.base_url", &self.image_api.base_url),
            ("chat.base_url", &self.chat.base_url),
            ("subscription.base_url", &self.subscription.base_url),
        ];
        if let Some(ref url) = self.upscale.base_url {
            urls.push(("upscale.base_url", url));
        }
        if let Some(ref history) = self.history {
            urls.push(("history.url", &history.url));
        }

        for (field, url) in urls {
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("{field} must be an http(s) URL, got '{url}'");
            }
        }

        Ok(())
    }

    fn validate_subscription(&self) -> anyhow::Result<()> {
        let interval = self.subscription.poll_interval_duration()?;
        let timeout = self.subscription.timeout_duration()?;

        if interval.is_zero() {
            anyhow::bail!("subscription.poll_interval must be greater than 0");
        }

        if interval > timeout {
            anyhow::bail!("subscription.poll_interval must not exceed subscription.timeout");
        }

        Ok(())
    }
}
